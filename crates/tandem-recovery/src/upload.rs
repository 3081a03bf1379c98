//! Device side of the backup fragment protocol
//!
//! One fragment is sent to the coordinator over the session transport, then
//! the device queue is polled until the matching `backup-share:ack` shows
//! up. Frames that are not that ack are skipped; they may be leftover
//! protocol traffic or the completion signal.

use crate::{BackupError, BackupResult};
use std::time::Duration;
use tandem_core::{
    BackupAckFrame, BackupConfig, BackupShareFrame, DeviceBackupArtifacts, Participant,
    TransportMessage,
};
use tandem_transport::Transport;
use tokio::time::{sleep, Instant};

/// Default time to wait for the coordinator's ack
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Default backoff between empty polls of the device queue
pub const DEFAULT_ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a fragment upload is performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Fragment to upload
    pub share_index: usize,
    /// Time to wait for the ack
    pub ack_timeout: Duration,
    /// Backoff between empty polls
    pub poll_interval: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            share_index: 0,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            poll_interval: DEFAULT_ACK_POLL_INTERVAL,
        }
    }
}

impl UploadOptions {
    /// Coordinator upload settings from `config`
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            share_index: config.coordinator_share_index,
            ack_timeout: config.ack_timeout(),
            poll_interval: config.ack_poll_interval(),
        }
    }
}

/// What an upload call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The fragment was sent and acknowledged
    Acknowledged,
    /// No fragment exists at the requested index; nothing was sent
    Skipped,
}

/// Upload fragment `options.share_index` of `backup` and wait for its ack.
///
/// The frame goes out as websocket text when the server socket is live,
/// otherwise through [`Transport::send`].
pub async fn upload_backup_fragment(
    transport: &dyn Transport,
    session_id: &str,
    key_id: &str,
    backup: &DeviceBackupArtifacts,
    options: &UploadOptions,
) -> BackupResult<UploadOutcome> {
    let Some(mut frame) =
        BackupShareFrame::from_artifacts(session_id, key_id, backup, options.share_index)
    else {
        tracing::warn!(
            key_id,
            share_index = options.share_index,
            "missing coordinator backup fragment"
        );
        return Ok(UploadOutcome::Skipped);
    };
    frame.ciphertext.key_id = key_id.to_string();
    let text = frame.to_json()?;

    tracing::info!(
        session_id,
        key_id,
        share_index = options.share_index,
        bytes = text.len(),
        "uploading coordinator backup fragment"
    );
    send_to_server(transport, text).await?;
    wait_for_ack(transport, key_id, options).await?;
    tracing::info!(session_id, key_id, "coordinator backup fragment delivered");
    Ok(UploadOutcome::Acknowledged)
}

async fn send_to_server(transport: &dyn Transport, text: String) -> BackupResult<()> {
    if let Some(sender) = transport.as_text_sender() {
        if sender.has_live_socket(Participant::Server)
            && sender.send_text(Participant::Server, &text).await?
        {
            return Ok(());
        }
    }
    tracing::debug!("sending backup fragment through the transport queue");
    transport
        .send(TransportMessage::to_server(text.into_bytes()))
        .await?;
    Ok(())
}

async fn wait_for_ack(
    transport: &dyn Transport,
    key_id: &str,
    options: &UploadOptions,
) -> BackupResult<()> {
    let started = Instant::now();
    while started.elapsed() < options.ack_timeout {
        let Some(frame) = transport.receive(Participant::Device).await? else {
            sleep(options.poll_interval).await;
            continue;
        };
        match BackupAckFrame::parse(&frame) {
            Some(ack) if ack.key_id == key_id => {
                if ack.is_ok() {
                    return Ok(());
                }
                let reason = ack
                    .error
                    .unwrap_or_else(|| "Coordinator rejected backup fragment".to_string());
                return Err(BackupError::Rejected(reason));
            }
            Some(ack) => {
                tracing::debug!(expected = key_id, got = %ack.key_id, "ack for another key");
            }
            None => tracing::trace!(bytes = frame.len(), "skipping non-ack frame"),
        }
    }

    Err(BackupError::AckTimeout {
        key_id: key_id.to_string(),
        waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
