//! Deterministic stand-in for the MPC primitive
//!
//! Every step of a [`StubEngine`] handle emits a small counter frame
//! `[role, step]` and reports completion once the configured number of steps
//! has run. No cryptography happens; the engine only records what the
//! coordination layer asked of it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tandem_core::{
    BackupCiphertext, BackupOptions, DeviceBackupArtifacts, DkgParams, EngineError,
    EngineResult, MpcEngine, Participant, SignParams, SignatureFormat, StepOutput,
};

/// DER signature with `r = 7` and `s = n - 5`, i.e. a high S value
pub const HIGH_S_DER: [u8; 40] = [
    0x30, 0x26, 0x02, 0x01, 0x07, 0x02, 0x21, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48,
    0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x3c,
];

/// Compact form of [`HIGH_S_DER`] after low-S normalization
pub fn high_s_compact() -> Vec<u8> {
    let mut out = vec![0u8; 64];
    out[31] = 7;
    out[63] = 5;
    out
}

/// Bytes returned by a raw-format finalization
pub const RAW_SIGNATURE: [u8; 64] = [0x11; 64];

/// Key id used when a DKG run is started without one
pub const DEFAULT_STUB_KEY: &[u8] = b"stub-key";

/// Behavior knobs
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Steps until a DKG handle is done; `None` never finishes
    pub dkg_rounds: Option<u32>,
    /// Steps until a signing handle is done; `None` never finishes
    pub sign_rounds: Option<u32>,
    /// The first step of every handle emits nothing
    pub silent_first_round: bool,
    /// Server signing handles also produce a signature
    pub server_receives_signature: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            dkg_rounds: Some(3),
            sign_rounds: Some(2),
            silent_first_round: false,
            server_receives_signature: false,
        }
    }
}

/// Context handed out by [`StubEngine::init`]
#[derive(Debug)]
pub struct StubContext {
    /// Sequence number of this context
    pub id: u64,
}

/// In-progress stub handle
#[derive(Debug)]
pub struct StubHandle {
    role: Participant,
    key_id: Vec<u8>,
    steps: u32,
    target: Option<u32>,
    inbound: Vec<Vec<u8>>,
    message: Option<Vec<u8>>,
}

impl StubHandle {
    fn step(&mut self, inbound: Option<&[u8]>, silent_first: bool) -> StepOutput {
        if let Some(frame) = inbound {
            self.inbound.push(frame.to_vec());
        }
        self.steps += 1;
        let outbound = if silent_first && self.steps == 1 {
            None
        } else {
            Some(vec![self.role.index() as u8, self.steps.min(u8::MAX as u32) as u8])
        };
        let done = self.target.is_some_and(|t| self.steps >= t);
        tracing::trace!(role = %self.role, step = self.steps, done, "stub step");
        StepOutput { outbound, done }
    }
}

/// Finalized stub key share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubKeypair {
    /// Role the share belongs to
    pub role: Participant,
    /// Key id bound at DKG time
    pub key_id: Vec<u8>,
}

impl StubKeypair {
    /// Export format: role index followed by the key id
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = vec![self.role.index() as u8];
        blob.extend_from_slice(&self.key_id);
        blob
    }

    /// Inverse of [`StubKeypair::to_blob`]
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        let (role, key_id) = blob.split_first()?;
        let role = match role {
            0 => Participant::Device,
            1 => Participant::Server,
            _ => return None,
        };
        Some(Self {
            role,
            key_id: key_id.to_vec(),
        })
    }
}

/// Deterministic [`MpcEngine`]
#[derive(Debug, Default)]
pub struct StubEngine {
    config: StubConfig,
    next_context: AtomicU64,
    inits: AtomicUsize,
    shutdowns: AtomicUsize,
    signed_messages: Mutex<Vec<Vec<u8>>>,
    restores: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl StubEngine {
    /// Engine with default round counts
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with custom behavior
    pub fn with_config(config: StubConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Engine whose DKG never completes
    pub fn never_finishing() -> Self {
        Self::with_config(StubConfig {
            dkg_rounds: None,
            sign_rounds: None,
            ..StubConfig::default()
        })
    }

    /// Contexts created so far
    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Contexts shut down so far
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Messages passed to `sign_set_message`, in call order
    pub fn signed_messages(&self) -> Vec<Vec<u8>> {
        self.signed_messages.lock().clone()
    }

    /// Fragment sets passed to `backup_restore`, one entry per call
    pub fn restore_calls(&self) -> Vec<Vec<Vec<u8>>> {
        self.restores.lock().clone()
    }
}

impl MpcEngine for StubEngine {
    type Context = StubContext;
    type Dkg = StubHandle;
    type Sign = StubHandle;
    type Keypair = StubKeypair;

    fn init(&self) -> EngineResult<StubContext> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(StubContext {
            id: self.next_context.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn shutdown(&self, _ctx: &StubContext) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn dkg_new(&self, _ctx: &StubContext, params: &DkgParams) -> EngineResult<StubHandle> {
        let key_id = params
            .key_id
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_STUB_KEY.to_vec());
        Ok(StubHandle {
            role: params.role,
            key_id,
            steps: 0,
            target: self.config.dkg_rounds,
            inbound: Vec::new(),
            message: None,
        })
    }

    fn dkg_step(
        &self,
        _ctx: &StubContext,
        handle: &mut StubHandle,
        inbound: Option<&[u8]>,
    ) -> EngineResult<StepOutput> {
        Ok(handle.step(inbound, self.config.silent_first_round))
    }

    fn dkg_finalize(&self, _ctx: &StubContext, handle: StubHandle) -> EngineResult<StubKeypair> {
        if !handle.target.is_some_and(|t| handle.steps >= t) {
            return Err(EngineError::new("dkg_finalize", "protocol not complete"));
        }
        Ok(StubKeypair {
            role: handle.role,
            key_id: handle.key_id,
        })
    }

    fn sign_new(
        &self,
        _ctx: &StubContext,
        keypair: &StubKeypair,
        _params: &SignParams,
    ) -> EngineResult<StubHandle> {
        Ok(StubHandle {
            role: keypair.role,
            key_id: keypair.key_id.clone(),
            steps: 0,
            target: self.config.sign_rounds,
            inbound: Vec::new(),
            message: None,
        })
    }

    fn sign_set_message(
        &self,
        _ctx: &StubContext,
        handle: &mut StubHandle,
        message: &[u8],
    ) -> EngineResult<()> {
        if handle.message.is_some() || handle.steps > 0 {
            return Err(EngineError::new("sign_set_message", "message already fixed"));
        }
        handle.message = Some(message.to_vec());
        self.signed_messages.lock().push(message.to_vec());
        Ok(())
    }

    fn sign_step(
        &self,
        _ctx: &StubContext,
        handle: &mut StubHandle,
        inbound: Option<&[u8]>,
    ) -> EngineResult<StepOutput> {
        if handle.message.is_none() {
            return Err(EngineError::new("sign_step", "message not set"));
        }
        Ok(handle.step(inbound, self.config.silent_first_round))
    }

    fn sign_finalize(
        &self,
        _ctx: &StubContext,
        handle: StubHandle,
        format: SignatureFormat,
    ) -> EngineResult<Option<Vec<u8>>> {
        if !handle.target.is_some_and(|t| handle.steps >= t) {
            return Err(EngineError::new("sign_finalize", "protocol not complete"));
        }
        if handle.role == Participant::Server && !self.config.server_receives_signature {
            return Ok(None);
        }
        Ok(Some(match format {
            SignatureFormat::Der => HIGH_S_DER.to_vec(),
            SignatureFormat::Raw => RAW_SIGNATURE.to_vec(),
        }))
    }

    fn keypair_export(&self, _ctx: &StubContext, keypair: &StubKeypair) -> EngineResult<Vec<u8>> {
        Ok(keypair.to_blob())
    }

    fn keypair_import(&self, _ctx: &StubContext, blob: &[u8]) -> EngineResult<StubKeypair> {
        StubKeypair::from_blob(blob)
            .ok_or_else(|| EngineError::new("keypair_import", "unrecognized key blob"))
    }

    fn backup_create(
        &self,
        _ctx: &StubContext,
        keypair: &StubKeypair,
        options: &BackupOptions,
    ) -> EngineResult<DeviceBackupArtifacts> {
        let share_count = options.share_count.unwrap_or(3);
        let threshold = options.threshold.unwrap_or(2);
        let shares = (0..share_count)
            .map(|i| {
                let mut share = vec![i as u8];
                share.extend_from_slice(b"fragment");
                share
            })
            .collect();
        Ok(DeviceBackupArtifacts {
            ciphertext: BackupCiphertext {
                kind: "device-backup".to_string(),
                curve: "secp256k1".to_string(),
                scheme: "stub-shamir".to_string(),
                key_id: keypair.key_id.clone(),
                threshold,
                share_count,
                label: options.label.clone().unwrap_or_default(),
                blob: keypair.to_blob(),
            },
            shares,
        })
    }

    fn backup_restore(
        &self,
        _ctx: &StubContext,
        ciphertext: &BackupCiphertext,
        fragments: &[Vec<u8>],
    ) -> EngineResult<StubKeypair> {
        self.restores.lock().push(fragments.to_vec());
        if fragments.len() < ciphertext.threshold as usize {
            return Err(EngineError::new(
                "backup_restore",
                format!(
                    "need {} fragments, got {}",
                    ciphertext.threshold,
                    fragments.len()
                ),
            ));
        }
        StubKeypair::from_blob(&ciphertext.blob)
            .ok_or_else(|| EngineError::new("backup_restore", "corrupt ciphertext"))
    }
}
