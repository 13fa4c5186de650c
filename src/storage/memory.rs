use std::collections::HashMap;
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{ClientError, Result};

/// Volatile store, used in tests and when no storage path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ClientError::Storage("memory store poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ClientError::Storage("memory store poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}
