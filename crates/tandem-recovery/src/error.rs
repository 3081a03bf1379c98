//! Backup and recovery errors

use tandem_core::{CoreError, EngineError, StorageError};
use tandem_transport::TransportError;
use thiserror::Error;

/// Result type for the backup upload protocol
pub type BackupResult<T> = std::result::Result<T, BackupError>;

/// Failures while uploading a backup fragment to the coordinator
#[derive(Debug, Error)]
pub enum BackupError {
    /// The coordinator answered with a non-ok ack
    #[error("Coordinator rejected backup fragment: {0}")]
    Rejected(String),

    /// No matching ack arrived in time
    #[error("Timed out after {waited_ms}ms waiting for backup acknowledgement for keyId {key_id}")]
    AckTimeout {
        /// Key the upload was for
        key_id: String,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// Sending the frame failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding the frame failed
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for HTTP collaborators and recovery
pub type RecoveryResult<T> = std::result::Result<T, RecoveryError>;

/// Failures while fetching fragments or restoring a key
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Both fragment sources were exhausted below the threshold
    #[error("Insufficient fragments to recover wallet: have {have}, need {need}")]
    InsufficientFragments {
        /// Distinct fragments collected
        have: usize,
        /// Threshold from the ciphertext
        need: usize,
    },

    /// An HTTP collaborator answered with an unexpected status
    #[error("HTTP status {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The request itself failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A response or stored payload could not be decoded
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A base URL is malformed
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// URL as configured
        url: String,
        /// Parser message
        reason: String,
    },

    /// A collaborator needed for this step is not configured
    #[error("{0} is not configured for recovery")]
    NotConfigured(&'static str),

    /// The restore primitive failed
    #[error("Restore failed: {0}")]
    Restore(#[from] EngineError),

    /// Persisting the recovered share failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Decoding a hex or base64 field failed
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RecoveryError {
    /// Payload error with `message`
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        RecoveryError::InvalidPayload(message.into())
    }
}

impl From<serde_json::Error> for RecoveryError {
    fn from(err: serde_json::Error) -> Self {
        RecoveryError::InvalidPayload(err.to_string())
    }
}
