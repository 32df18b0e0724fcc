pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// The fixed set of durable entries. Every write replaces the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    CurrentUser,
    AccessToken,
    RefreshToken,
    Companies,
    CurrentCompany,
}

impl StorageKey {
    pub const ALL: [StorageKey; 5] = [
        StorageKey::CurrentUser,
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::Companies,
        StorageKey::CurrentCompany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::CurrentUser => "user",
            StorageKey::AccessToken => "access_token",
            StorageKey::RefreshToken => "refresh_token",
            StorageKey::Companies => "companies",
            StorageKey::CurrentCompany => "current_company",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt entry: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable client-side key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: StorageKey) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: StorageKey, value: Value) -> Result<(), StorageError>;
    async fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    async fn remove_all(&self, keys: &[StorageKey]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(*key).await?;
        }
        Ok(())
    }
}

/// Read and decode an entry. A value that no longer decodes is treated as absent.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: StorageKey,
) -> Result<Option<T>, StorageError> {
    let Some(value) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            tracing::warn!("Discarding unreadable storage entry '{}': {e}", key.as_str());
            Ok(None)
        }
    }
}

pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: StorageKey,
    value: &T,
) -> Result<(), StorageError> {
    store.set(key, serde_json::to_value(value)?).await
}
