//! Device-local backup copy
//!
//! The full backup (ciphertext plus every fragment) is kept in share storage
//! under `"{keyId}:backup:device"` so a later recovery can supply fragments
//! without the third-party host.

use crate::{RecoveryError, RecoveryResult};
use serde::{Deserialize, Serialize};
use tandem_core::{
    codec, DeviceBackupArtifacts, EncodedBackupCiphertext, ShareRecord, ShareStorage,
};

/// Storage key of the local backup for `key_id`
pub fn device_backup_key(key_id: &str) -> String {
    format!("{key_id}:backup:device")
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBackup {
    ciphertext: EncodedBackupCiphertext,
    shares: Vec<PersistedShare>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedShare {
    index: usize,
    value: String,
}

/// Store `backup` for `key_id`. Failures are logged, never returned.
///
/// Returns whether the backup was written.
pub async fn persist_device_backup_locally(
    storage: &dyn ShareStorage,
    key_id: &str,
    backup: &DeviceBackupArtifacts,
) -> bool {
    let payload = PersistedBackup {
        ciphertext: EncodedBackupCiphertext::from(&backup.ciphertext),
        shares: backup
            .shares
            .iter()
            .enumerate()
            .map(|(index, share)| PersistedShare {
                index,
                value: codec::to_hex(share),
            })
            .collect(),
    };
    let json = match serde_json::to_vec(&payload) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(key_id, error = %e, "failed to encode local backup");
            return false;
        }
    };

    match storage
        .save(&ShareRecord::new(device_backup_key(key_id), json))
        .await
    {
        Ok(()) => {
            tracing::info!(key_id, shares = backup.shares.len(), "persisted local backup");
            true
        }
        Err(e) => {
            tracing::warn!(key_id, error = %e, "failed to persist local backup");
            false
        }
    }
}

/// Load the backup stored by [`persist_device_backup_locally`], if any
pub async fn load_persisted_device_backup(
    storage: &dyn ShareStorage,
    key_id: &str,
) -> RecoveryResult<Option<DeviceBackupArtifacts>> {
    let Some(record) = storage.load(&device_backup_key(key_id)).await? else {
        return Ok(None);
    };
    let mut payload: PersistedBackup = serde_json::from_slice(&record.blob)?;
    payload.shares.sort_by_key(|share| share.index);

    let shares = payload
        .shares
        .iter()
        .map(|share| codec::from_hex(&share.value))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RecoveryError::invalid_payload(format!("local backup share: {e}")))?;
    Ok(Some(DeviceBackupArtifacts {
        ciphertext: payload.ciphertext.decode()?,
        shares,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::InMemoryShareStorage;
    use tandem_testkit::{sample_artifacts, FailingShareStorage};

    #[tokio::test]
    async fn local_backup_survives_a_round_trip() {
        let storage = InMemoryShareStorage::new();
        let backup = sample_artifacts(&[0x42]);
        assert!(persist_device_backup_locally(&storage, "42", &backup).await);

        let raw = storage.load("42:backup:device").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw.blob).unwrap();
        assert_eq!(json["shares"][1]["index"], 1);
        assert_eq!(json["ciphertext"]["shareCount"], 3);

        let loaded = load_persisted_device_backup(&storage, "42").await.unwrap();
        assert_eq!(loaded, Some(backup));
    }

    #[tokio::test]
    async fn missing_backup_is_none() {
        let storage = InMemoryShareStorage::new();
        assert_eq!(load_persisted_device_backup(&storage, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn persist_failures_are_swallowed() {
        let storage = FailingShareStorage::failing_on("7:backup:device");
        assert!(!persist_device_backup_locally(&storage, "7", &sample_artifacts(&[7])).await);
    }
}
