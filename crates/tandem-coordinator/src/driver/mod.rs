//! Round-trip driver
//!
//! Pumps an opaque stepping primitive to completion. Each locally simulated
//! role is wrapped in a [`Stepper`]; a [`RoundStrategy`] selected by
//! [`DriveMode`] decides how steppers exchange frames through the transport.
//!
//! Callers must not drive two runs concurrently over one transport: the
//! queues carry no round numbers, so interleaved runs would consume each
//! other's frames.

mod dkg;
mod sign;
mod stepper;
mod strategy;

pub use dkg::{run_dkg, DkgOptions, DkgOutcome};
pub use sign::{run_sign, SignOptions};
pub use stepper::{DkgStepper, SignStepper, Stepper};
pub use strategy::{DeviceOnlyStrategy, DualStrategy, RoundStrategy, ServerOnlyStrategy};

use crate::DriverResult;
use std::fmt;
use tandem_core::{DriverConfig, Participant};
use tandem_transport::Transport;

/// Which roles run in this process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DriveMode {
    /// Both roles are simulated locally
    #[default]
    Dual,
    /// Only the server role is local; the device is remote
    ServerOnly,
    /// Only the device role is local; the server is remote
    DeviceOnly,
}

impl DriveMode {
    /// Strategy implementing this mode under `config`'s limits
    pub fn strategy(self, config: &DriverConfig) -> Box<dyn RoundStrategy> {
        match self {
            DriveMode::Dual => Box::new(DualStrategy::new(config.dual_max_rounds)),
            DriveMode::ServerOnly => Box::new(ServerOnlyStrategy::new(config)),
            DriveMode::DeviceOnly => Box::new(DeviceOnlyStrategy::new(config)),
        }
    }

    /// The single local role, or `None` in dual mode
    pub fn local_role(self) -> Option<Participant> {
        match self {
            DriveMode::Dual => None,
            DriveMode::ServerOnly => Some(Participant::Server),
            DriveMode::DeviceOnly => Some(Participant::Device),
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriveMode::Dual => "dual",
            DriveMode::ServerOnly => "server-only",
            DriveMode::DeviceOnly => "device-only",
        })
    }
}

/// Discard every frame still queued for `participant`
pub(crate) async fn drain_queue(
    transport: &dyn Transport,
    participant: Participant,
) -> DriverResult<usize> {
    let mut drained = 0;
    while transport.receive(participant).await?.is_some() {
        drained += 1;
    }
    if drained > 0 {
        tracing::debug!(%participant, drained, "discarded leftover frames");
    }
    Ok(drained)
}
