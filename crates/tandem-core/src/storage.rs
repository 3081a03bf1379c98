//! Share storage contract
//!
//! Exported key shares and small metadata records are persisted through
//! [`ShareStorage`]. Blobs are never interpreted here and are copied on both
//! save and load, so callers never alias stored bytes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors reported by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The backend is not reachable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A persisted, opaque key share or metadata blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRecord {
    /// Storage key, e.g. `"{keyId}:server"`
    pub key_id: String,
    /// Opaque contents, round-tripped byte for byte
    pub blob: Vec<u8>,
}

impl ShareRecord {
    /// Create a record
    pub fn new(key_id: impl Into<String>, blob: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: key_id.into(),
            blob: blob.into(),
        }
    }
}

/// Async key-value contract for key shares
#[async_trait]
pub trait ShareStorage: Send + Sync {
    /// Persist a copy of `record`, replacing any previous value
    async fn save(&self, record: &ShareRecord) -> StorageResult<()>;

    /// Load an independent copy of the record stored under `key_id`
    async fn load(&self, key_id: &str) -> StorageResult<Option<ShareRecord>>;

    /// Remove the record stored under `key_id`, if any
    async fn remove(&self, key_id: &str) -> StorageResult<()>;
}

/// Process-local storage for tests and single-process deployments
#[derive(Debug, Clone, Default)]
pub struct InMemoryShareStorage {
    state: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryShareStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ShareStorage for InMemoryShareStorage {
    async fn save(&self, record: &ShareRecord) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.insert(record.key_id.clone(), record.blob.clone());
        Ok(())
    }

    async fn load(&self, key_id: &str) -> StorageResult<Option<ShareRecord>> {
        let state = self.state.read().await;
        Ok(state
            .get(key_id)
            .map(|blob| ShareRecord::new(key_id, blob.clone())))
    }

    async fn remove(&self, key_id: &str) -> StorageResult<()> {
        self.state.write().await.remove(key_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_blob_is_not_aliased() {
        let storage = InMemoryShareStorage::new();
        let mut record = ShareRecord::new("k1:server", vec![1, 2, 3]);
        storage.save(&record).await.unwrap();

        record.blob[0] = 0xff;
        let mut loaded = storage.load("k1:server").await.unwrap().unwrap();
        assert_eq!(loaded.blob, vec![1, 2, 3]);

        loaded.blob[1] = 0xff;
        let reloaded = storage.load("k1:server").await.unwrap().unwrap();
        assert_eq!(reloaded.blob, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn remove_and_missing_keys() {
        let storage = InMemoryShareStorage::new();
        assert!(storage.load("absent").await.unwrap().is_none());

        storage.save(&ShareRecord::new("a", vec![0])).await.unwrap();
        storage.remove("a").await.unwrap();
        storage.remove("a").await.unwrap();
        assert!(storage.is_empty().await);
    }
}
