//! Tandem Core
//!
//! Shared vocabulary for the two-party wallet coordinator: participants,
//! transport messages, persisted shares, backup artifacts and the wire frames
//! exchanged during handshakes and backup uploads.
//!
//! The cryptographic primitive is never implemented here. It is reached
//! through the [`MpcEngine`] capability trait so that coordination code stays
//! independent of whatever binding provides the actual MPC math.

pub mod backup;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod frames;
pub mod logging;
pub mod signature;
pub mod storage;
pub mod types;

pub use backup::{BackupCiphertext, BackupOptions, DeviceBackupArtifacts};
pub use config::{
    BackupConfig, DriverConfig, LoggingConfig, RecoveryConfig, ServerConfig, TandemConfig,
};
pub use engine::{
    DkgParams, EngineError, EngineResult, MpcEngine, SessionContext, SignParams,
    SignatureFormat, StepOutput,
};
pub use error::{CoreError, Result};
pub use frames::{
    BackupAckFrame, BackupShareFrame, EncodedBackupCiphertext, HelloFrame, IntentKind,
    MessageEncoding, BACKUP_ACK_TYPE, BACKUP_SHARE_TYPE, HELLO_TYPE,
};
pub use storage::{InMemoryShareStorage, ShareRecord, ShareStorage, StorageError, StorageResult};
pub use types::{Participant, SessionId, TransportMessage};
