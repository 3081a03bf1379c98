//! Backup fragment acceptance
//!
//! After DKG the device uploads one backup fragment over the session socket.
//! The coordinator stores the frame under `"{keyId}:backup:coordinator"` and
//! answers with an ack; invalid uploads are answered with an error ack.

use crate::PolicyResult;
use std::time::Duration;
use tandem_core::{
    BackupAckFrame, BackupShareFrame, Participant, SessionId, ShareRecord, ShareStorage,
    TransportMessage,
};
use tandem_transport::Transport;
use tokio::time::{sleep, Instant};

/// Result of waiting for a backup upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentAcceptance {
    /// Fragment stored and acknowledged
    Stored {
        /// Wallet key id from the frame
        key_id: String,
        /// Storage key the frame was saved under
        storage_key: String,
    },
    /// Upload answered with an error ack
    Rejected {
        /// Wallet key id from the frame
        key_id: String,
        /// Reason sent back to the device
        reason: String,
    },
    /// Nothing arrived before the deadline or the device went away
    NotReceived,
}

/// Storage key of the coordinator-held fragment for `key_id`
pub fn coordinator_fragment_key(key_id: &str) -> String {
    format!("{key_id}:backup:coordinator")
}

/// Wait up to `wait` for a backup upload on the server queue.
///
/// Frames that are not backup uploads are skipped.
pub async fn accept_backup_fragment(
    transport: &dyn Transport,
    storage: &dyn ShareStorage,
    session_id: &SessionId,
    wait: Duration,
    poll_interval: Duration,
) -> PolicyResult<FragmentAcceptance> {
    let deadline = Instant::now() + wait;
    loop {
        match transport.receive(Participant::Server).await? {
            Some(frame) => {
                if let Some(upload) = BackupShareFrame::parse(&frame) {
                    return store_fragment(transport, storage, session_id, upload).await;
                }
                tracing::trace!(bytes = frame.len(), "skipping non-backup frame");
                continue;
            }
            None => {
                let device_gone = transport
                    .as_text_sender()
                    .is_some_and(|t| !t.has_live_socket(Participant::Device));
                if device_gone {
                    tracing::debug!(session = %session_id, "device left before uploading a backup");
                    return Ok(FragmentAcceptance::NotReceived);
                }
            }
        }
        if Instant::now() >= deadline {
            tracing::debug!(session = %session_id, "no backup fragment received");
            return Ok(FragmentAcceptance::NotReceived);
        }
        sleep(poll_interval).await;
    }
}

async fn store_fragment(
    transport: &dyn Transport,
    storage: &dyn ShareStorage,
    session_id: &SessionId,
    upload: BackupShareFrame,
) -> PolicyResult<FragmentAcceptance> {
    let key_id = upload.key_id.clone();
    let ack_session = Some(session_id.to_string());

    if let Err(reason) = validate_upload(&upload) {
        tracing::warn!(session = %session_id, key_id = %key_id, %reason, "rejected backup fragment");
        let ack = BackupAckFrame::rejected(key_id.clone(), ack_session, reason.clone());
        reply(transport, &ack).await?;
        return Ok(FragmentAcceptance::Rejected { key_id, reason });
    }

    let storage_key = coordinator_fragment_key(&key_id);
    let record = ShareRecord::new(storage_key.clone(), upload.to_json()?.into_bytes());
    if let Err(e) = storage.save(&record).await {
        let reason = e.to_string();
        tracing::warn!(session = %session_id, key_id = %key_id, error = %reason, "failed to store backup fragment");
        reply(transport, &BackupAckFrame::rejected(key_id.clone(), ack_session, reason.clone())).await?;
        return Ok(FragmentAcceptance::Rejected { key_id, reason });
    }

    reply(transport, &BackupAckFrame::ok(key_id.clone(), ack_session)).await?;
    tracing::info!(
        session = %session_id,
        key_id = %key_id,
        share_index = ?upload.share_index,
        "backup fragment stored"
    );
    Ok(FragmentAcceptance::Stored {
        key_id,
        storage_key,
    })
}

fn validate_upload(upload: &BackupShareFrame) -> Result<(), String> {
    if upload.key_id.is_empty() {
        return Err("missing keyId".to_string());
    }
    match upload.decode_share() {
        Ok(Some(share)) if !share.is_empty() => {}
        Ok(_) => return Err("missing share".to_string()),
        Err(e) => return Err(format!("invalid share: {e}")),
    }
    let ciphertext = upload
        .ciphertext
        .decode()
        .map_err(|e| format!("invalid ciphertext: {e}"))?;
    ciphertext.validate().map_err(|e| e.to_string())
}

async fn reply(transport: &dyn Transport, ack: &BackupAckFrame) -> PolicyResult<()> {
    let text = ack.to_json()?;
    if let Some(sender) = transport.as_text_sender() {
        if sender.send_text(Participant::Device, &text).await? {
            return Ok(());
        }
    }
    transport
        .send(TransportMessage::to_device(text.into_bytes()))
        .await?;
    Ok(())
}
