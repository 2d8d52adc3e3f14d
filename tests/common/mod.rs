// Shared fixtures for the pipeline integration tests
//
// Every test builds its own graph and cache backend; nothing is shared
// between tests, so they run in parallel without interference.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis::{CacheBackend, CacheError, Environment, MemoryCache, Signature, Value};

/// Build an environment from integer bindings
pub fn ints(pairs: &[(&str, i64)]) -> Environment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::Int(*v)))
        .collect()
}

/// Counts how often a node callable runs
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Backend that counts every call and can be told to fail
#[derive(Debug, Default)]
pub struct CountingBackend {
    inner: MemoryCache,
    calls: AtomicUsize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn io_error() -> CacheError {
        CacheError::Io {
            path: "counting".into(),
            source: std::io::Error::other("injected fault"),
        }
    }
}

impl CacheBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn get_meta(&self, key: &str) -> Result<Option<Signature>, CacheError> {
        self.count();
        if self.fail_reads {
            return Err(Self::io_error());
        }
        self.inner.get_meta(key)
    }

    fn set_meta(&self, signature: &Signature) -> Result<(), CacheError> {
        self.count();
        if self.fail_writes {
            return Err(Self::io_error());
        }
        self.inner.set_meta(signature)
    }

    fn get_blob(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.count();
        if self.fail_reads {
            return Err(Self::io_error());
        }
        self.inner.get_blob(key)
    }

    fn set_blob(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.count();
        if self.fail_writes {
            return Err(Self::io_error());
        }
        self.inner.set_blob(key, value)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.count();
        self.inner.clear()
    }
}
