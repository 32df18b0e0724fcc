use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{KeyValueStore, StorageError, StorageKey};

/// Process-local store. Used by tests and by callers that opt out of persistence.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<StorageKey, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, handy for asserting on durable state.
    pub fn snapshot(&self, key: StorageKey) -> Option<Value> {
        self.entries.get(&key).map(|v| v.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: StorageKey) -> Result<Option<Value>, StorageError> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: StorageKey, value: Value) -> Result<(), StorageError> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.entries.remove(&key);
        Ok(())
    }
}
