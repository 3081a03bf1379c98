//! Tandem Recovery
//!
//! Everything that keeps a device key recoverable: pushing backup fragments
//! to the coordinator and a third-party host, keeping a local copy, and
//! rebuilding the key share from whichever fragments are reachable.

pub mod error;
pub mod http;
pub mod local;
pub mod orchestrator;
pub mod upload;

pub use error::{BackupError, BackupResult, RecoveryError, RecoveryResult};
pub use http::{
    normalize_base_url, upload_third_party_fragment, CoordinatorApi, FragmentHost,
    HttpCoordinatorApi, HttpFragmentHost, RecoveryArtifact, DEFAULT_THIRD_PARTY_SHARE_INDEX,
};
pub use local::{device_backup_key, load_persisted_device_backup, persist_device_backup_locally};
pub use orchestrator::{RecoveredKey, RecoveryOrchestrator};
pub use upload::{
    upload_backup_fragment, UploadOptions, UploadOutcome, DEFAULT_ACK_POLL_INTERVAL,
    DEFAULT_ACK_TIMEOUT,
};
