//! MPC capability
//!
//! The threshold-ECDSA primitive is an external collaborator reached through
//! [`MpcEngine`]. Coordination code only ever sees opaque handles: a context
//! per session, a stepping handle per DKG or signing run, and exported key
//! shares as bytes. Handles are owned values and are freed on drop.

use crate::backup::{BackupCiphertext, BackupOptions, DeviceBackupArtifacts};
use crate::types::Participant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by the external primitive
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("MPC {operation} failed: {message}")]
pub struct EngineError {
    /// Engine operation that failed
    pub operation: &'static str,
    /// Message reported by the binding
    pub message: String,
}

impl EngineError {
    /// Create an engine error for `operation`
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Output of a single protocol step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Frame to relay to the counterpart, if the round produced one
    pub outbound: Option<Vec<u8>>,
    /// The local role has completed the protocol
    pub done: bool,
}

/// Parameters for a new DKG handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkgParams {
    /// Role this handle plays
    pub role: Participant,
    /// Requested key identifier
    pub key_id: Option<Vec<u8>>,
    /// Session identifier bound into the transcript
    pub session_id: Option<Vec<u8>>,
}

/// Parameters for a new signing handle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignParams {
    /// Session identifier bound into the transcript
    pub session_id: Option<Vec<u8>>,
    /// Additional authenticated data
    pub extra_aad: Option<Vec<u8>>,
}

/// Serialization requested from signature finalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFormat {
    /// ASN.1 DER, the primitive's native encoding
    #[default]
    Der,
    /// Fixed-width `r || s`
    Raw,
}

/// Opaque two-party MPC primitive.
///
/// Implementations wrap a foreign binding. Every method is synchronous; the
/// coordination layer schedules calls between transport suspension points.
pub trait MpcEngine: Send + Sync + 'static {
    /// Per-session cryptographic context
    type Context: Send + Sync + 'static;
    /// In-progress DKG handle
    type Dkg: Send + 'static;
    /// In-progress signing handle
    type Sign: Send + 'static;
    /// Finalized key share
    type Keypair: Send + Sync + 'static;

    /// Create a fresh context
    fn init(&self) -> EngineResult<Self::Context>;

    /// Release a context. Called exactly once per context.
    fn shutdown(&self, ctx: &Self::Context);

    /// Start a DKG run for one role
    fn dkg_new(&self, ctx: &Self::Context, params: &DkgParams) -> EngineResult<Self::Dkg>;

    /// Advance a DKG run with an optional inbound frame
    fn dkg_step(
        &self,
        ctx: &Self::Context,
        handle: &mut Self::Dkg,
        inbound: Option<&[u8]>,
    ) -> EngineResult<StepOutput>;

    /// Turn a completed DKG run into a key share
    fn dkg_finalize(&self, ctx: &Self::Context, handle: Self::Dkg) -> EngineResult<Self::Keypair>;

    /// Start a signing run over an existing key share
    fn sign_new(
        &self,
        ctx: &Self::Context,
        keypair: &Self::Keypair,
        params: &SignParams,
    ) -> EngineResult<Self::Sign>;

    /// Fix the message to be signed. Called once, before the first step.
    fn sign_set_message(
        &self,
        ctx: &Self::Context,
        handle: &mut Self::Sign,
        message: &[u8],
    ) -> EngineResult<()>;

    /// Advance a signing run with an optional inbound frame
    fn sign_step(
        &self,
        ctx: &Self::Context,
        handle: &mut Self::Sign,
        inbound: Option<&[u8]>,
    ) -> EngineResult<StepOutput>;

    /// Produce the signature, if this role receives one
    fn sign_finalize(
        &self,
        ctx: &Self::Context,
        handle: Self::Sign,
        format: SignatureFormat,
    ) -> EngineResult<Option<Vec<u8>>>;

    /// Export a key share as an opaque blob
    fn keypair_export(&self, ctx: &Self::Context, keypair: &Self::Keypair)
        -> EngineResult<Vec<u8>>;

    /// Import a key share previously exported
    fn keypair_import(&self, ctx: &Self::Context, blob: &[u8]) -> EngineResult<Self::Keypair>;

    /// Split a key share into backup fragments
    fn backup_create(
        &self,
        ctx: &Self::Context,
        keypair: &Self::Keypair,
        options: &BackupOptions,
    ) -> EngineResult<DeviceBackupArtifacts>;

    /// Reassemble a key share from a ciphertext and enough fragments
    fn backup_restore(
        &self,
        ctx: &Self::Context,
        ciphertext: &BackupCiphertext,
        fragments: &[Vec<u8>],
    ) -> EngineResult<Self::Keypair>;
}

/// A context owned by one session.
///
/// `release` is idempotent and also runs on drop, so a context is shut down
/// exactly once however the session ends.
pub struct SessionContext<E: MpcEngine> {
    engine: Arc<E>,
    inner: E::Context,
    released: AtomicBool,
}

impl<E: MpcEngine> SessionContext<E> {
    /// Initialize a new context on `engine`
    pub fn open(engine: Arc<E>) -> EngineResult<Self> {
        let inner = engine.init()?;
        Ok(Self {
            engine,
            inner,
            released: AtomicBool::new(false),
        })
    }

    /// Engine that owns this context
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Shared handle to the engine
    pub fn engine_arc(&self) -> Arc<E> {
        Arc::clone(&self.engine)
    }

    /// Raw context for engine calls
    pub fn raw(&self) -> &E::Context {
        &self.inner
    }

    /// Shut the context down if it is still live
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.engine.shutdown(&self.inner);
            tracing::debug!("MPC context released");
        }
    }

    /// Whether `release` has run
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<E: MpcEngine> Drop for SessionContext<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: MpcEngine> fmt::Debug for SessionContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
