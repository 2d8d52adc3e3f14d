pub mod disk;
pub mod memory;

pub use disk::{DiskCache, DiskCacheStats};
pub use memory::MemoryCache;

use std::path::PathBuf;
use thiserror::Error;

use crate::signature::Signature;
use crate::value::Value;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode cache entry '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode cache entry '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("Value for '{key}' cannot be persisted: {reason}")]
    Unpersistable { key: String, reason: &'static str },

    #[error("Cache lock poisoned")]
    Poisoned,
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Storage backend for node signatures and outputs
///
/// The two halves are independent: a signature may exist without its blob
/// (and the runner then treats the lookup as a miss). Implementations must
/// make each write atomic from the point of view of concurrent readers.
pub trait CacheBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Retrieve the stored signature for a cache key
    fn get_meta(&self, key: &str) -> Result<Option<Signature>, CacheError>;

    /// Store a signature under `signature.key`, replacing any previous one
    fn set_meta(&self, signature: &Signature) -> Result<(), CacheError>;

    /// Retrieve a stored output
    fn get_blob(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store an output, replacing any previous one
    fn set_blob(&self, key: &str, value: &Value) -> Result<(), CacheError>;

    /// Drop every signature and output
    fn clear(&self) -> Result<(), CacheError>;
}
