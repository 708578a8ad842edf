//! In-memory cache, for tests and embedders without a disk.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{CacheError, LocalCache, validate_key};

/// Cache slots held in a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        validate_key(key)?;
        Ok(self.slots().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        validate_key(key)?;
        self.slots().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;
        self.slots().remove(key);
        Ok(())
    }
}
