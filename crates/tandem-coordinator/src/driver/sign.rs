//! Threshold signing

use super::{drain_queue, DriveMode, SignStepper, Stepper};
use crate::{DriverError, DriverResult};
use tandem_core::signature::der_to_compact;
use tandem_core::{DriverConfig, MpcEngine, Participant, SessionContext, SignParams, SignatureFormat};
use tandem_transport::Transport;

/// Inputs of a signing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Bytes to sign, set on every handle before the first step
    pub message: Vec<u8>,
    /// Session identifier bound into the transcript
    pub session_id: Option<Vec<u8>>,
    /// Additional authenticated data
    pub extra_aad: Option<Vec<u8>>,
    /// Requested encoding; `None` yields a 64-byte low-S `r || s`
    pub format: Option<SignatureFormat>,
    /// Which roles run locally
    pub mode: DriveMode,
}

/// Run a signing round trip in `options.mode`.
///
/// Dual mode returns the device handle's signature; single-role modes
/// return whatever the local handle finalizes to.
pub async fn run_sign<E: MpcEngine>(
    ctx: &SessionContext<E>,
    transport: &dyn Transport,
    config: &DriverConfig,
    device: Option<&E::Keypair>,
    server: Option<&E::Keypair>,
    options: SignOptions,
) -> DriverResult<Option<Vec<u8>>> {
    let params = SignParams {
        session_id: options.session_id.clone(),
        extra_aad: options.extra_aad.clone(),
    };
    let strategy = options.mode.strategy(config);
    tracing::debug!(mode = %options.mode, bytes = options.message.len(), "starting sign");

    let new_stepper = |role: Participant, keypair: Option<&E::Keypair>| {
        let keypair = keypair.ok_or(DriverError::MissingKeypair(role))?;
        Ok::<_, DriverError>(SignStepper::new(ctx, role, keypair, &params, &options.message)?)
    };

    match options.mode {
        DriveMode::Dual => {
            let mut server = new_stepper(Participant::Server, server)?;
            let mut device = new_stepper(Participant::Device, device)?;
            {
                let mut steppers: [&mut dyn Stepper; 2] = [&mut server, &mut device];
                strategy.drive("sign", &mut steppers, transport).await?;
            }
            drop(server);
            finalize_signature(device, options.format)
        }
        DriveMode::ServerOnly => {
            let mut server = new_stepper(Participant::Server, server)?;
            {
                let mut steppers: [&mut dyn Stepper; 1] = [&mut server];
                strategy.drive("sign", &mut steppers, transport).await?;
            }
            finalize_signature(server, options.format)
        }
        DriveMode::DeviceOnly => {
            let mut device = new_stepper(Participant::Device, device)?;
            {
                let mut steppers: [&mut dyn Stepper; 1] = [&mut device];
                strategy.drive("sign", &mut steppers, transport).await?;
            }
            let signature = finalize_signature(device, options.format)?;
            drain_queue(transport, Participant::Device).await?;
            Ok(signature)
        }
    }
}

fn finalize_signature<E: MpcEngine>(
    stepper: SignStepper<'_, E>,
    requested: Option<SignatureFormat>,
) -> DriverResult<Option<Vec<u8>>> {
    let signature = stepper.finalize(requested.unwrap_or_default())?;
    match (requested, signature) {
        (None, Some(der)) => Ok(Some(der_to_compact(&der)?)),
        (_, signature) => Ok(signature),
    }
}
