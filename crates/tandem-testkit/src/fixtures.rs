//! Shared fixtures

use crate::engine::StubKeypair;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Once;
use tandem_core::{
    BackupCiphertext, DeviceBackupArtifacts, InMemoryShareStorage, Participant, ShareRecord,
    ShareStorage, StorageError, StorageResult,
};

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`, once per process
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Device key share for `key_id`
pub fn device_keypair(key_id: &[u8]) -> StubKeypair {
    StubKeypair {
        role: Participant::Device,
        key_id: key_id.to_vec(),
    }
}

/// Three-fragment, threshold-two backup of the device share for `key_id`,
/// shaped like what the stub engine's `backup_create` produces
pub fn sample_artifacts(key_id: &[u8]) -> DeviceBackupArtifacts {
    let keypair = device_keypair(key_id);
    DeviceBackupArtifacts {
        ciphertext: BackupCiphertext {
            kind: "device-backup".to_string(),
            curve: "secp256k1".to_string(),
            scheme: "stub-shamir".to_string(),
            key_id: key_id.to_vec(),
            threshold: 2,
            share_count: 3,
            label: b"session".to_vec(),
            blob: keypair.to_blob(),
        },
        shares: (0u8..3)
            .map(|i| {
                let mut share = vec![i];
                share.extend_from_slice(b"fragment");
                share
            })
            .collect(),
    }
}

/// In-memory storage whose saves fail for chosen keys
#[derive(Debug, Default)]
pub struct FailingShareStorage {
    inner: InMemoryShareStorage,
    failing_keys: Mutex<Vec<String>>,
}

impl FailingShareStorage {
    /// Storage failing every save under `key`
    pub fn failing_on(key: impl Into<String>) -> Self {
        let storage = Self::default();
        storage.failing_keys.lock().push(key.into());
        storage
    }

    /// Underlying store
    pub fn inner(&self) -> &InMemoryShareStorage {
        &self.inner
    }
}

#[async_trait]
impl ShareStorage for FailingShareStorage {
    async fn save(&self, record: &ShareRecord) -> StorageResult<()> {
        if self.failing_keys.lock().contains(&record.key_id) {
            return Err(StorageError::Backend(format!(
                "refusing to write {}",
                record.key_id
            )));
        }
        self.inner.save(record).await
    }

    async fn load(&self, key_id: &str) -> StorageResult<Option<ShareRecord>> {
        self.inner.load(key_id).await
    }

    async fn remove(&self, key_id: &str) -> StorageResult<()> {
        self.inner.remove(key_id).await
    }
}
