//! Mode strategies
//!
//! Every strategy alternates receive, step and relay until its steppers are
//! done or its round bound runs out. A round that produces no outbound frame
//! and does not finish simply moves on to the next receive.

use super::Stepper;
use crate::{DriverError, DriverResult};
use async_trait::async_trait;
use std::time::Duration;
use tandem_core::{DriverConfig, Participant, TransportMessage};
use tandem_transport::Transport;
use tokio::time::{sleep, Instant};

/// How steppers are driven for one [`super::DriveMode`]
#[async_trait]
pub trait RoundStrategy: Send + Sync {
    /// Drive `steppers` to completion, in the given order within each round.
    ///
    /// Returns the number of rounds used.
    async fn drive(
        &self,
        intent: &'static str,
        steppers: &mut [&mut dyn Stepper],
        transport: &dyn Transport,
    ) -> DriverResult<u32>;
}

/// Both roles stepped in-process through the transport queues
#[derive(Debug, Clone, Copy)]
pub struct DualStrategy {
    max_rounds: u32,
}

impl DualStrategy {
    /// Strategy bounded at `max_rounds`
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }
}

#[async_trait]
impl RoundStrategy for DualStrategy {
    async fn drive(
        &self,
        intent: &'static str,
        steppers: &mut [&mut dyn Stepper],
        transport: &dyn Transport,
    ) -> DriverResult<u32> {
        for round in 0..self.max_rounds {
            if steppers.iter().all(|s| s.is_done()) {
                return Ok(round);
            }
            for stepper in steppers.iter_mut() {
                if stepper.is_done() {
                    continue;
                }
                let role = stepper.role();
                let inbound = transport.receive(role).await?;
                let output = stepper.step(inbound.as_deref())?;
                if let Some(frame) = output.outbound {
                    transport
                        .send(TransportMessage::new(role.peer(), frame))
                        .await?;
                }
            }
        }

        if steppers.iter().all(|s| s.is_done()) {
            return Ok(self.max_rounds);
        }
        tracing::warn!(intent, rounds = self.max_rounds, "dual-mode run stalled");
        Err(DriverError::Stalled {
            intent,
            rounds: self.max_rounds,
        })
    }
}

/// Only the server role is local
#[derive(Debug, Clone, Copy)]
pub struct ServerOnlyStrategy {
    limits: SingleRoleLimits,
}

impl ServerOnlyStrategy {
    /// Strategy bounded by `config.server_max_rounds`
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            limits: SingleRoleLimits::new(config.server_max_rounds, config),
        }
    }
}

#[async_trait]
impl RoundStrategy for ServerOnlyStrategy {
    async fn drive(
        &self,
        intent: &'static str,
        steppers: &mut [&mut dyn Stepper],
        transport: &dyn Transport,
    ) -> DriverResult<u32> {
        drive_single_role(intent, Participant::Server, steppers, transport, self.limits).await
    }
}

/// Only the device role is local
#[derive(Debug, Clone, Copy)]
pub struct DeviceOnlyStrategy {
    limits: SingleRoleLimits,
}

impl DeviceOnlyStrategy {
    /// Strategy bounded by `config.device_max_rounds`
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            limits: SingleRoleLimits::new(config.device_max_rounds, config),
        }
    }
}

#[async_trait]
impl RoundStrategy for DeviceOnlyStrategy {
    async fn drive(
        &self,
        intent: &'static str,
        steppers: &mut [&mut dyn Stepper],
        transport: &dyn Transport,
    ) -> DriverResult<u32> {
        drive_single_role(intent, Participant::Device, steppers, transport, self.limits).await
    }
}

#[derive(Debug, Clone, Copy)]
struct SingleRoleLimits {
    max_rounds: u32,
    poll_interval: Duration,
    peer_timeout: Option<Duration>,
}

impl SingleRoleLimits {
    fn new(max_rounds: u32, config: &DriverConfig) -> Self {
        Self {
            max_rounds,
            poll_interval: config.poll_interval(),
            peer_timeout: config.peer_timeout(),
        }
    }
}

async fn drive_single_role(
    intent: &'static str,
    role: Participant,
    steppers: &mut [&mut dyn Stepper],
    transport: &dyn Transport,
    limits: SingleRoleLimits,
) -> DriverResult<u32> {
    let stepper = steppers
        .iter_mut()
        .find(|s| s.role() == role)
        .ok_or(DriverError::MissingKeypair(role))?;

    let mut inbound = if stepper.awaits_peer_first() {
        Some(wait_for_peer(intent, role, 0, transport, limits).await?)
    } else {
        None
    };

    for round in 0..limits.max_rounds {
        tracing::trace!(
            intent,
            %role,
            round,
            inbound = inbound.as_ref().map_or(0, Vec::len),
            "step"
        );
        let output = stepper.step(inbound.take().as_deref())?;
        if let Some(frame) = output.outbound {
            tracing::trace!(intent, %role, round, bytes = frame.len(), "relaying to peer");
            transport
                .send(TransportMessage::new(role.peer(), frame))
                .await?;
        }
        if output.done {
            tracing::debug!(intent, %role, rounds = round + 1, "protocol complete");
            return Ok(round + 1);
        }
        if round + 1 == limits.max_rounds {
            break;
        }
        inbound = Some(wait_for_peer(intent, role, round, transport, limits).await?);
    }

    tracing::warn!(intent, %role, rounds = limits.max_rounds, "single-role run stalled");
    Err(DriverError::Stalled {
        intent,
        rounds: limits.max_rounds,
    })
}

async fn wait_for_peer(
    intent: &'static str,
    role: Participant,
    round: u32,
    transport: &dyn Transport,
    limits: SingleRoleLimits,
) -> DriverResult<Vec<u8>> {
    let deadline = limits.peer_timeout.map(|t| Instant::now() + t);
    loop {
        if let Some(frame) = transport.receive(role).await? {
            return Ok(frame);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::warn!(intent, %role, round, "peer frame did not arrive in time");
            return Err(DriverError::PeerTimeout { intent, round });
        }
        sleep(limits.poll_interval).await;
    }
}
