//! Session policies
//!
//! The registry never decides which protocol a session runs. Every accepted
//! handshake is handed to a [`SessionPolicy`]; [`StandardSessionPolicy`] is
//! the deployment default that answers device sessions with the server half
//! of the requested protocol.

use crate::backup::accept_backup_fragment;
use crate::driver::{DkgOptions, DriveMode, SignOptions};
use crate::handshake::SessionIntent;
use crate::registry::SessionReady;
use crate::{PolicyError, PolicyResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{codec, MpcEngine, Participant, ShareStorage, TandemConfig, TransportMessage};
use tandem_transport::Transport;

/// Frame sent to the device once the server half of a protocol finished
pub const DONE_SIGNAL: [u8; 4] = [0xff, 0x00, 0xff, 0x00];

/// Reacts to sessions becoming ready
#[async_trait]
pub trait SessionPolicy<E: MpcEngine>: Send + Sync + 'static {
    /// Called once per accepted handshake, on its own task
    async fn on_session_ready(&self, session: SessionReady<E>);
}

/// Serves device sessions: server-only DKG then backup acceptance, or
/// server-only signing with the stored server share.
#[derive(Clone)]
pub struct StandardSessionPolicy {
    storage: Arc<dyn ShareStorage>,
    backup_wait: Duration,
    backup_poll: Duration,
}

impl StandardSessionPolicy {
    /// Policy reading server shares from `storage`
    pub fn new(storage: Arc<dyn ShareStorage>) -> Self {
        let defaults = TandemConfig::default();
        Self {
            storage,
            backup_wait: defaults.server.backup_wait(),
            backup_poll: defaults.backup.ack_poll_interval(),
        }
    }

    /// Policy using the waits configured in `config`
    pub fn from_config(storage: Arc<dyn ShareStorage>, config: &TandemConfig) -> Self {
        Self {
            storage,
            backup_wait: config.server.backup_wait(),
            backup_poll: config.backup.ack_poll_interval(),
        }
    }

    /// How long to wait for a backup upload after DKG
    pub fn with_backup_wait(mut self, wait: Duration) -> Self {
        self.backup_wait = wait;
        self
    }

    async fn serve<E: MpcEngine>(&self, session: &SessionReady<E>) -> PolicyResult<()> {
        match &session.intent {
            SessionIntent::Dkg {
                key_id,
                session_id_hint,
            } => {
                let options = DkgOptions {
                    key_id: decode_optional(key_id.as_deref())?,
                    session_id: decode_optional(session_id_hint.as_deref())?,
                    mode: DriveMode::ServerOnly,
                    backup: None,
                };
                let outcome = session.coordinator.run_dkg(&session.context, options).await?;
                tracing::info!(session = %session.session_id, key_id = %outcome.key_id, "server dkg complete");
                send_done(&session.transport).await;

                let acceptance = accept_backup_fragment(
                    &session.transport,
                    self.storage.as_ref(),
                    &session.session_id,
                    self.backup_wait,
                    self.backup_poll,
                )
                .await?;
                tracing::debug!(session = %session.session_id, ?acceptance, "backup window closed");
                Ok(())
            }
            SessionIntent::Sign {
                key_id,
                session_id_hint,
                message,
            } => {
                let record = self
                    .storage
                    .load(&format!("{key_id}:server"))
                    .await?
                    .ok_or_else(|| PolicyError::MissingShare(key_id.clone()))?;
                let message = message
                    .clone()
                    .ok_or_else(|| PolicyError::MissingMessage(key_id.clone()))?;

                let ctx = &session.context;
                let keypair = ctx.engine().keypair_import(ctx.raw(), &record.blob)?;
                let options = SignOptions {
                    message,
                    session_id: decode_optional(session_id_hint.as_deref())?,
                    mode: DriveMode::ServerOnly,
                    ..SignOptions::default()
                };
                session
                    .coordinator
                    .run_sign(ctx, None, Some(&keypair), options)
                    .await?;
                tracing::info!(session = %session.session_id, key_id = %key_id, "server signing complete");
                send_done(&session.transport).await;
                Ok(())
            }
            SessionIntent::Refresh { key_id, .. } => {
                tracing::warn!(session = %session.session_id, key_id = %key_id, "Unhandled intent refresh");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<E: MpcEngine> SessionPolicy<E> for StandardSessionPolicy {
    async fn on_session_ready(&self, session: SessionReady<E>) {
        if session.role != Participant::Device {
            tracing::debug!(session = %session.session_id, role = %session.role, "ignoring non-device session");
            return;
        }
        if let Err(e) = self.serve(&session).await {
            tracing::error!(
                session = %session.session_id,
                intent = %session.intent.kind(),
                error = %e,
                "session policy failed"
            );
        }
        session.close();
    }
}

impl std::fmt::Debug for StandardSessionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardSessionPolicy")
            .field("backup_wait", &self.backup_wait)
            .finish_non_exhaustive()
    }
}

fn decode_optional(value: Option<&str>) -> PolicyResult<Option<Vec<u8>>> {
    Ok(value
        .filter(|v| !v.is_empty())
        .map(codec::from_hex)
        .transpose()?)
}

async fn send_done(transport: &dyn Transport) {
    if let Err(e) = transport
        .send(TransportMessage::to_device(DONE_SIGNAL.to_vec()))
        .await
    {
        tracing::warn!(error = %e, "done signal not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_transport::{InMemoryTransport, TransportError, TransportResult};

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn send(&self, _message: TransportMessage) -> TransportResult<()> {
            Err(TransportError::SocketNotOpen("device gone".to_string()))
        }

        async fn receive(&self, _participant: Participant) -> TransportResult<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn done_signal_is_queued_for_the_device() {
        let transport = InMemoryTransport::new();
        send_done(&transport).await;
        assert_eq!(
            transport.receive(Participant::Device).await.unwrap(),
            Some(DONE_SIGNAL.to_vec())
        );
    }

    #[tokio::test]
    async fn undeliverable_done_signal_is_not_an_error() {
        let () = send_done(&RefusingTransport).await;
    }
}
