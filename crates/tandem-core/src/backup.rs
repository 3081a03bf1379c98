//! Backup artifacts produced by the backup-create primitive
//!
//! A [`BackupCiphertext`] is metadata plus an opaque ciphertext; the
//! accompanying fragments are independently opaque and `threshold` of them
//! reconstruct the key.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Default number of fragments produced for a device backup
pub const DEFAULT_SHARE_COUNT: u32 = 3;

/// Default number of fragments needed to restore a device backup
pub const DEFAULT_THRESHOLD: u32 = 2;

/// Backup metadata and ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCiphertext {
    /// Backup kind reported by the primitive
    pub kind: String,
    /// Curve of the backed-up key
    pub curve: String,
    /// Secret-sharing scheme identifier
    pub scheme: String,
    /// Key identifier bytes
    pub key_id: Vec<u8>,
    /// Fragments required for restore
    pub threshold: u32,
    /// Fragments produced
    pub share_count: u32,
    /// Caller-supplied label, often the session id
    pub label: Vec<u8>,
    /// Opaque ciphertext
    pub blob: Vec<u8>,
}

impl BackupCiphertext {
    /// Check `threshold <= share_count` and that a restore is possible at all
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(CoreError::invalid_backup("threshold must be at least 1"));
        }
        if self.threshold > self.share_count {
            return Err(CoreError::invalid_backup(format!(
                "threshold {} exceeds share count {}",
                self.threshold, self.share_count
            )));
        }
        Ok(())
    }
}

/// Ciphertext plus every fragment produced for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBackupArtifacts {
    /// Backup metadata and ciphertext
    pub ciphertext: BackupCiphertext,
    /// One entry per fragment, `shares.len() == ciphertext.share_count`
    pub shares: Vec<Vec<u8>>,
}

impl DeviceBackupArtifacts {
    /// Fragment at `index`, if one was produced
    pub fn share(&self, index: usize) -> Option<&[u8]> {
        self.shares.get(index).map(Vec::as_slice)
    }

    /// Validate metadata and fragment count
    pub fn validate(&self) -> Result<()> {
        self.ciphertext.validate()?;
        if self.shares.len() != self.ciphertext.share_count as usize {
            return Err(CoreError::invalid_backup(format!(
                "expected {} shares, found {}",
                self.ciphertext.share_count,
                self.shares.len()
            )));
        }
        Ok(())
    }
}

/// Caller preferences for backup creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    /// `Some(false)` disables backup creation
    pub enabled: Option<bool>,
    /// Requested restore threshold
    pub threshold: Option<u32>,
    /// Requested fragment count
    pub share_count: Option<u32>,
    /// Label bound into the ciphertext
    pub label: Option<Vec<u8>>,
}

impl BackupOptions {
    /// Whether a backup should be produced at all
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    /// Fill gaps from `fallback` and clamp into a valid configuration.
    ///
    /// The share count is at least one, the threshold lies in
    /// `1..=share_count`, and the label defaults to `session_id`.
    pub fn resolve(&self, fallback: Option<&BackupOptions>, session_id: &[u8]) -> BackupOptions {
        let enabled = self.enabled.or(fallback.and_then(|f| f.enabled));
        if enabled == Some(false) {
            return BackupOptions {
                enabled,
                ..BackupOptions::default()
            };
        }

        let share_count = self
            .share_count
            .or(fallback.and_then(|f| f.share_count))
            .unwrap_or(DEFAULT_SHARE_COUNT)
            .max(1);
        let threshold = self
            .threshold
            .or(fallback.and_then(|f| f.threshold))
            .unwrap_or(DEFAULT_THRESHOLD)
            .clamp(1, share_count);
        let label = self
            .label
            .clone()
            .or_else(|| fallback.and_then(|f| f.label.clone()))
            .unwrap_or_else(|| session_id.to_vec());

        BackupOptions {
            enabled,
            threshold: Some(threshold),
            share_count: Some(share_count),
            label: Some(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ciphertext(threshold: u32, share_count: u32) -> BackupCiphertext {
        BackupCiphertext {
            kind: "device-backup".into(),
            curve: "secp256k1".into(),
            scheme: "shamir".into(),
            key_id: vec![1],
            threshold,
            share_count,
            label: Vec::new(),
            blob: vec![0xee],
        }
    }

    #[test]
    fn threshold_must_not_exceed_share_count() {
        assert!(ciphertext(2, 3).validate().is_ok());
        assert!(ciphertext(3, 3).validate().is_ok());
        assert!(ciphertext(4, 3).validate().is_err());
        assert!(ciphertext(0, 3).validate().is_err());
    }

    #[test]
    fn artifacts_share_count_must_match() {
        let artifacts = DeviceBackupArtifacts {
            ciphertext: ciphertext(2, 3),
            shares: vec![vec![1], vec![2]],
        };
        assert!(artifacts.validate().is_err());
        assert_eq!(artifacts.share(1), Some(&[2u8][..]));
        assert_eq!(artifacts.share(5), None);
    }

    #[test]
    fn resolve_clamps_threshold_and_defaults_label() {
        let requested = BackupOptions {
            threshold: Some(9),
            share_count: Some(0),
            ..BackupOptions::default()
        };
        let resolved = requested.resolve(None, b"sid");
        assert_eq!(resolved.share_count, Some(1));
        assert_eq!(resolved.threshold, Some(1));
        assert_eq!(resolved.label.as_deref(), Some(&b"sid"[..]));
    }

    #[test]
    fn resolve_prefers_override_then_fallback() {
        let fallback = BackupOptions {
            threshold: Some(3),
            share_count: Some(5),
            label: Some(b"fallback".to_vec()),
            ..BackupOptions::default()
        };
        let resolved = BackupOptions {
            share_count: Some(4),
            ..BackupOptions::default()
        }
        .resolve(Some(&fallback), b"sid");
        assert_eq!(resolved.share_count, Some(4));
        assert_eq!(resolved.threshold, Some(3));
        assert_eq!(resolved.label.as_deref(), Some(&b"fallback"[..]));
    }

    #[test]
    fn disabled_backup_stays_disabled() {
        let disabled = BackupOptions {
            enabled: Some(false),
            threshold: Some(2),
            ..BackupOptions::default()
        };
        let resolved = disabled.resolve(None, b"sid");
        assert!(!resolved.is_enabled());
        assert_eq!(resolved.threshold, None);
    }
}
