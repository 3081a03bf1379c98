//! Wallet errors

use tandem_coordinator::DriverError;
use tandem_core::{CoreError, EngineError, StorageError};
use tandem_recovery::RecoveryError;
use tandem_transport::TransportError;
use thiserror::Error;

/// Result type for wallet flows
pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// Failures surfaced by [`crate::DeviceWallet`] and [`crate::connect_to_coordinator`]
#[derive(Debug, Error)]
pub enum WalletError {
    /// The coordinator already knows this wallet; recovery applies instead
    #[error("Wallet {0} already exists remotely. Start the recovery flow instead of create_key")]
    AlreadyExists(String),

    /// No key id was given and none is recorded as current
    #[error("No wallet key is available. Create a key first")]
    NoKey,

    /// The device share for a key is not in storage
    #[error("Device share for key {0} not found")]
    MissingShare(String),

    /// The signing run finished without a signature for the device
    #[error("Coordinator did not produce a signature")]
    NoSignature,

    /// Connecting or talking to the coordinator failed
    #[error("Coordinator connection failed: {0}")]
    Transport(#[from] TransportError),

    /// The DKG or signing run failed
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The primitive failed outside a protocol run
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Reading or writing share storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Recovery failed
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Frame encoding failed
    #[error(transparent)]
    Core(#[from] CoreError),
}
