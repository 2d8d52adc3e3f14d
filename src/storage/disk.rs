use super::{CacheBackend, CacheError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::thread;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::logging::{components, operations, status};
use crate::signature::Signature;
use crate::value::Value;

const METADATA_FILE: &str = "metadata.json";
const BLOBS_DIR: &str = "blobs";
const ZSTD_LEVEL: i32 = 3;

/// Signature fields as persisted in `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSignature {
    code_hash: String,
    env_hash: String,
    inputs_hash: String,
    deps_hash: String,
    timestamp: DateTime<Utc>,
}

impl StoredSignature {
    fn from_signature(signature: &Signature) -> Self {
        Self {
            code_hash: signature.code_hash.clone(),
            env_hash: signature.env_hash.clone(),
            inputs_hash: signature.inputs_hash.clone(),
            deps_hash: signature.deps_hash.clone(),
            timestamp: signature.timestamp,
        }
    }

    fn into_signature(self, key: &str) -> Signature {
        Signature {
            key: key.to_string(),
            code_hash: self.code_hash,
            env_hash: self.env_hash,
            inputs_hash: self.inputs_hash,
            deps_hash: self.deps_hash,
            timestamp: self.timestamp,
        }
    }
}

/// Durable cache backend
///
/// Layout:
/// - `<dir>/metadata.json` - every signature, keyed by cache key. Loaded once
///   on construction and rewritten wholesale (temp file, then rename) on
///   every signature write.
/// - `<dir>/blobs/ab/cd1234...` - one zstd-compressed JSON payload per cache
///   key, sharded git-style by the SHA-256 of the key. Loaded lazily.
///
/// One writer process per directory is supported; readers in other
/// processes only ever observe complete files.
pub struct DiskCache {
    dir: PathBuf,
    blobs_dir: PathBuf,
    meta: RwLock<BTreeMap<String, StoredSignature>>,
}

/// Disk cache statistics
#[derive(Debug, Clone)]
pub struct DiskCacheStats {
    pub entries: usize,
    pub blobs: u64,
    pub blob_bytes: u64,
    pub dir: PathBuf,
}

impl DiskCache {
    /// Open (or create) a disk cache rooted at `dir`
    ///
    /// Unreadable or corrupt metadata is discarded and the cache starts cold.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        let blobs_dir = dir.join(BLOBS_DIR);
        fs::create_dir_all(&blobs_dir).map_err(|e| CacheError::io(&blobs_dir, e))?;

        let meta = Self::load_metadata(&dir.join(METADATA_FILE));
        debug!(
            component = components::CACHE_DISK,
            operation = operations::LOAD,
            entry_count = meta.len(),
            dir = %dir.display(),
            "opened disk cache"
        );

        Ok(Self {
            dir,
            blobs_dir,
            meta: RwLock::new(meta),
        })
    }

    fn load_metadata(path: &Path) -> BTreeMap<String, StoredSignature> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache metadata, starting cold");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache metadata, starting cold");
                BTreeMap::new()
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Blob path for a cache key
    /// Uses git-style sharding: first 2 hex chars as subdirectory
    fn blob_path(&self, key: &str) -> PathBuf {
        let hex_id = hex::encode(Sha256::digest(key.as_bytes()));
        let (prefix, suffix) = hex_id.split_at(2);
        self.blobs_dir.join(prefix).join(suffix)
    }

    /// Cache keys with stored signatures, sorted
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        let meta = self.meta.read().map_err(|_| CacheError::Poisoned)?;
        Ok(meta.keys().cloned().collect())
    }

    pub fn stats(&self) -> Result<DiskCacheStats, CacheError> {
        let entries = self.meta.read().map_err(|_| CacheError::Poisoned)?.len();
        let mut blobs = 0u64;
        let mut blob_bytes = 0u64;

        for entry in WalkDir::new(&self.blobs_dir).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                CacheError::io(path, e.into())
            })?;
            if entry.file_type().is_file() && !is_temp_file(entry.path()) {
                blobs += 1;
                blob_bytes += entry
                    .metadata()
                    .map_err(|e| CacheError::io(entry.path(), e.into()))?
                    .len();
            }
        }

        Ok(DiskCacheStats {
            entries,
            blobs,
            blob_bytes,
            dir: self.dir.clone(),
        })
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(".tmp."))
}

/// Write atomically: temp file in the same directory, then rename over `path`
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| CacheError::io(path, std::io::ErrorKind::InvalidInput.into()))?;
    fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

    // PID + thread ID keep concurrent writers off each other's temp files
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    let temp_path = parent.join(format!(
        "{}.tmp.{}.{:?}",
        file_name,
        std::process::id(),
        thread::current().id()
    ));

    let mut file = fs::File::create(&temp_path).map_err(|e| CacheError::io(&temp_path, e))?;
    file.write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(|e| CacheError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| CacheError::io(path, e))?;
    Ok(())
}

impl CacheBackend for DiskCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn get_meta(&self, key: &str) -> Result<Option<Signature>, CacheError> {
        let meta = self.meta.read().map_err(|_| CacheError::Poisoned)?;
        Ok(meta.get(key).cloned().map(|s| s.into_signature(key)))
    }

    fn set_meta(&self, signature: &Signature) -> Result<(), CacheError> {
        // Hold the write lock across the file rewrite so same-process writes
        // land in order
        let mut meta = self.meta.write().map_err(|_| CacheError::Poisoned)?;
        meta.insert(
            signature.key.clone(),
            StoredSignature::from_signature(signature),
        );

        let json = serde_json::to_vec_pretty(&*meta).map_err(|source| CacheError::Encode {
            key: signature.key.clone(),
            source,
        })?;
        write_atomic(&self.metadata_path(), &json)
    }

    fn get_blob(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.blob_path(key);

        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = key, status = status::MISS, "blob not found");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        let json = zstd::decode_all(compressed.as_slice()).map_err(|e| CacheError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let value = serde_json::from_slice(&json).map_err(|e| CacheError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            key = key,
            status = status::SUCCESS,
            size_bytes = compressed.len(),
            "blob loaded"
        );
        Ok(Some(value))
    }

    fn set_blob(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let reason = if value.contains_handle() {
            Some("holds a live handle")
        } else if value.contains_non_finite() {
            Some("holds a non-finite float")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CacheError::Unpersistable {
                key: key.to_string(),
                reason,
            });
        }

        let json = serde_json::to_vec(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)
            .map_err(|e| CacheError::io(self.blob_path(key), e))?;

        write_atomic(&self.blob_path(key), &compressed)
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut meta = self.meta.write().map_err(|_| CacheError::Poisoned)?;
        meta.clear();

        let metadata_path = self.metadata_path();
        if metadata_path.exists() {
            fs::remove_file(&metadata_path).map_err(|e| CacheError::io(&metadata_path, e))?;
        }

        if self.blobs_dir.exists() {
            fs::remove_dir_all(&self.blobs_dir).map_err(|e| CacheError::io(&self.blobs_dir, e))?;
        }
        fs::create_dir_all(&self.blobs_dir).map_err(|e| CacheError::io(&self.blobs_dir, e))?;

        Ok(())
    }
}
