//! Distributed key generation

use super::{drain_queue, DkgStepper, DriveMode, Stepper};
use crate::DriverResult;
use tandem_core::{
    codec, BackupOptions, DeviceBackupArtifacts, DkgParams, DriverConfig, MpcEngine, Participant,
    SessionContext, ShareRecord, ShareStorage,
};
use tandem_transport::Transport;

/// Inputs of a DKG run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DkgOptions {
    /// Requested key identifier
    pub key_id: Option<Vec<u8>>,
    /// Session identifier bound into the transcript
    pub session_id: Option<Vec<u8>>,
    /// Which roles run locally
    pub mode: DriveMode,
    /// Backup preferences, device-only mode
    pub backup: Option<BackupOptions>,
}

/// Key shares produced locally by a DKG run
#[derive(Debug)]
pub struct DkgOutcome<K> {
    /// Device share, when the device role ran locally
    pub device: Option<K>,
    /// Server share, when the server role ran locally
    pub server: Option<K>,
    /// Backup artifacts, device-only mode with backup enabled
    pub backup: Option<DeviceBackupArtifacts>,
    /// Hex key id the local share was persisted under
    pub key_id: String,
}

/// Run DKG in `options.mode` and persist the local share.
///
/// The server share lands under `"{keyId}:server"`; a device-only run
/// stores the device share under the bare key id. The key id is the hex of
/// the requested id, falling back to the hex of the exported share.
pub async fn run_dkg<E: MpcEngine>(
    ctx: &SessionContext<E>,
    transport: &dyn Transport,
    storage: &dyn ShareStorage,
    config: &DriverConfig,
    backup_defaults: &BackupOptions,
    options: DkgOptions,
) -> DriverResult<DkgOutcome<E::Keypair>> {
    tracing::debug!(mode = %options.mode, "starting dkg");
    let params = |role| DkgParams {
        role,
        key_id: options.key_id.clone(),
        session_id: options.session_id.clone(),
    };
    let strategy = options.mode.strategy(config);

    match options.mode {
        DriveMode::Dual => {
            let mut device = DkgStepper::new(ctx, &params(Participant::Device))?;
            let mut server = DkgStepper::new(ctx, &params(Participant::Server))?;
            {
                let mut steppers: [&mut dyn Stepper; 2] = [&mut device, &mut server];
                strategy.drive("dkg", &mut steppers, transport).await?;
            }
            let device = device.finalize()?;
            let server = server.finalize()?;
            let key_id = persist_server_share(ctx, storage, options.key_id.as_deref(), &server).await?;
            Ok(DkgOutcome {
                device: Some(device),
                server: Some(server),
                backup: None,
                key_id,
            })
        }
        DriveMode::ServerOnly => {
            let mut server = DkgStepper::new(ctx, &params(Participant::Server))?;
            {
                let mut steppers: [&mut dyn Stepper; 1] = [&mut server];
                strategy.drive("dkg", &mut steppers, transport).await?;
            }
            let server = server.finalize()?;
            let key_id = persist_server_share(ctx, storage, options.key_id.as_deref(), &server).await?;
            Ok(DkgOutcome {
                device: None,
                server: Some(server),
                backup: None,
                key_id,
            })
        }
        DriveMode::DeviceOnly => {
            let mut device = DkgStepper::new(ctx, &params(Participant::Device))?;
            {
                let mut steppers: [&mut dyn Stepper; 1] = [&mut device];
                strategy.drive("dkg", &mut steppers, transport).await?;
            }
            let device = device.finalize()?;

            let blob = ctx.engine().keypair_export(ctx.raw(), &device)?;
            let key_id = resolve_key_id(options.key_id.as_deref(), &blob);
            storage.save(&ShareRecord::new(key_id.clone(), blob)).await?;
            tracing::info!(key_id = %key_id, "device share persisted");

            drain_queue(transport, Participant::Device).await?;

            let requested = options.backup.unwrap_or_default();
            let backup = if requested.is_enabled() {
                let resolved = requested.resolve(
                    Some(backup_defaults),
                    options.session_id.as_deref().unwrap_or_default(),
                );
                tracing::debug!(
                    threshold = ?resolved.threshold,
                    share_count = ?resolved.share_count,
                    "creating device backup"
                );
                Some(ctx.engine().backup_create(ctx.raw(), &device, &resolved)?)
            } else {
                tracing::debug!("device backup disabled");
                None
            };

            Ok(DkgOutcome {
                device: Some(device),
                server: None,
                backup,
                key_id,
            })
        }
    }
}

fn resolve_key_id(requested: Option<&[u8]>, exported: &[u8]) -> String {
    match requested {
        Some(id) if !id.is_empty() => codec::to_hex(id),
        _ => codec::to_hex(exported),
    }
}

async fn persist_server_share<E: MpcEngine>(
    ctx: &SessionContext<E>,
    storage: &dyn ShareStorage,
    requested_key_id: Option<&[u8]>,
    server: &E::Keypair,
) -> DriverResult<String> {
    let blob = ctx.engine().keypair_export(ctx.raw(), server)?;
    let key_id = resolve_key_id(requested_key_id, &blob);
    storage
        .save(&ShareRecord::new(format!("{key_id}:server"), blob))
        .await?;
    tracing::info!(key_id = %key_id, "server share persisted");
    Ok(key_id)
}
