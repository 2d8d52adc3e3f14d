use super::{CacheBackend, CacheError};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::signature::Signature;
use crate::value::Value;

/// In-process cache backend
///
/// Lives as long as the value does; nothing is persisted. Outputs holding
/// live handles are stored as-is.
#[derive(Debug, Default)]
pub struct MemoryCache {
    meta: RwLock<HashMap<String, Signature>>,
    blobs: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.meta.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get_meta(&self, key: &str) -> Result<Option<Signature>, CacheError> {
        let meta = self.meta.read().map_err(|_| CacheError::Poisoned)?;
        Ok(meta.get(key).cloned())
    }

    fn set_meta(&self, signature: &Signature) -> Result<(), CacheError> {
        let mut meta = self.meta.write().map_err(|_| CacheError::Poisoned)?;
        meta.insert(signature.key.clone(), signature.clone());
        Ok(())
    }

    fn get_blob(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let blobs = self.blobs.read().map_err(|_| CacheError::Poisoned)?;
        Ok(blobs.get(key).cloned())
    }

    fn set_blob(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let mut blobs = self.blobs.write().map_err(|_| CacheError::Poisoned)?;
        blobs.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.meta.write().map_err(|_| CacheError::Poisoned)?.clear();
        self.blobs.write().map_err(|_| CacheError::Poisoned)?.clear();
        Ok(())
    }
}
