use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::graph::Graph;
use crate::runner::{CacheConfig, ExecutionMode, Runner};
use crate::signature::SignatureOptions;
use crate::storage::{CacheBackend, DiskCache, MemoryCache};

/// Environment variable overriding the durable cache location
pub const CACHE_DIR_ENV: &str = "TRELLIS_CACHE_DIR";

/// Complete trellis configuration (loaded from TOML file)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Disk,
}

/// `[cache]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub backend: BackendKind,

    /// Disk backend location; defaults to `default_cache_dir()`
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Manual invalidation token folded into every signature
    #[serde(default)]
    pub env_hash: Option<String>,

    #[serde(default = "default_dependency_depth")]
    pub dependency_depth: usize,

    #[serde(default = "default_serialization_depth")]
    pub serialization_depth: usize,

    #[serde(default = "default_true")]
    pub per_item_caching: bool,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: BackendKind::default(),
            dir: None,
            env_hash: None,
            dependency_depth: default_dependency_depth(),
            serialization_depth: default_serialization_depth(),
            per_item_caching: true,
            verbose: false,
        }
    }
}

/// `[runner]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default)]
    pub mode: ExecutionMode,

    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            batch_threshold: default_batch_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dependency_depth() -> usize {
    SignatureOptions::default().dependency_depth
}

fn default_serialization_depth() -> usize {
    SignatureOptions::default().serialization_depth
}

fn default_batch_threshold() -> usize {
    2
}

impl TrellisConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: TrellisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runner.batch_threshold == 0 {
            anyhow::bail!("runner.batch_threshold must be at least 1");
        }

        if let Some(dir) = &self.cache.dir {
            if dir.as_os_str().is_empty() {
                anyhow::bail!("cache.dir must not be empty when set");
            }
        }

        Ok(())
    }

    /// Directory the disk backend uses under this configuration
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Build the runner cache configuration, opening the disk backend if
    /// one is configured
    pub fn into_cache_config(&self) -> Result<CacheConfig> {
        // A disabled cache never touches its backend, so skip opening the directory
        let backend: Arc<dyn CacheBackend> = match (self.cache.enabled, self.cache.backend) {
            (false, _) | (true, BackendKind::Memory) => Arc::new(MemoryCache::new()),
            (true, BackendKind::Disk) => {
                let dir = self.cache_dir();
                let cache = DiskCache::new(&dir)
                    .with_context(|| format!("Failed to open disk cache at {}", dir.display()))?;
                Arc::new(cache)
            }
        };

        Ok(CacheConfig {
            enabled: self.cache.enabled,
            backend,
            env_hash: self.cache.env_hash.clone(),
            dependency_depth: self.cache.dependency_depth,
            serialization_depth: self.cache.serialization_depth,
            per_item_caching: self.cache.per_item_caching,
            verbose: self.cache.verbose,
        })
    }

    /// A runner over `graph` configured from both tables
    pub fn runner(&self, graph: impl Into<Arc<Graph>>) -> Result<Runner> {
        Ok(Runner::new(graph)
            .mode(self.runner.mode)
            .batch_threshold(self.runner.batch_threshold)
            .cache(self.into_cache_config()?))
    }

    /// Example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = TrellisConfig {
            cache: CacheSettings {
                enabled: true,
                backend: BackendKind::Disk,
                dir: Some(PathBuf::from(".trellis/cache")),
                env_hash: Some("v1".to_string()),
                ..Default::default()
            },
            runner: RunnerSettings::default(),
        };
        Ok(toml::to_string_pretty(&config)?)
    }
}

/// Default location of the durable cache
///
/// `TRELLIS_CACHE_DIR` wins, then `$XDG_CACHE_HOME/trellis`, then the
/// platform cache directory, then `.trellis/cache` under the working
/// directory.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg_cache).join("trellis")
    } else if let Some(cache) = dirs::cache_dir() {
        cache.join("trellis")
    } else {
        PathBuf::from(".trellis").join("cache")
    }
}
