//! Core error types
//!
//! Errors raised while decoding wire values, validating backup metadata or
//! loading configuration. Higher layers wrap these with `#[from]`.

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the shared core layer
#[derive(Debug, Error)]
pub enum CoreError {
    /// Hex payload could not be decoded
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Base64 payload could not be decoded
    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Signature bytes are not a well-formed encoding
    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// Backup metadata violates its invariants
    #[error("Invalid backup ciphertext: {0}")]
    InvalidBackup(String),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid backup error
    pub fn invalid_backup(message: impl Into<String>) -> Self {
        Self::InvalidBackup(message.into())
    }
}
