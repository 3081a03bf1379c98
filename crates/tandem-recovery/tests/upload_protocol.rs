//! Device-side backup upload against an in-memory coordinator queue

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use std::time::Duration;
use tandem_core::{BackupAckFrame, BackupShareFrame, Participant, TransportMessage};
use tandem_recovery::{upload_backup_fragment, BackupError, UploadOptions, UploadOutcome};
use tandem_testkit::{init_test_tracing, sample_artifacts};
use tandem_transport::{InMemoryTransport, Transport};

fn fast_options() -> UploadOptions {
    UploadOptions {
        share_index: 0,
        ack_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(2),
    }
}

async fn queue_for_device(transport: &InMemoryTransport, frame: impl Into<Vec<u8>>) {
    transport
        .send(TransportMessage::to_device(frame.into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn acknowledged_upload_sends_one_frame_to_the_server() {
    init_test_tracing();
    let transport = InMemoryTransport::new();
    queue_for_device(&transport, BackupAckFrame::ok("ab", None).to_json().unwrap()).await;

    let outcome = upload_backup_fragment(
        &transport,
        "session-1",
        "ab",
        &sample_artifacts(&[0xab]),
        &fast_options(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, UploadOutcome::Acknowledged);

    let sent = transport.drain(Participant::Server);
    assert_eq!(sent.len(), 1);
    let frame = BackupShareFrame::parse(&sent[0]).unwrap();
    assert_eq!(frame.session_id, "session-1");
    assert_eq!(frame.key_id, "ab");
    assert_eq!(frame.ciphertext.key_id, "ab");
    assert_eq!(frame.share_index, Some(0));
    assert_eq!(frame.decode_share().unwrap(), Some(b"\x00fragment".to_vec()));
}

#[tokio::test]
async fn unrelated_frames_are_skipped_while_waiting() {
    let transport = InMemoryTransport::new();
    queue_for_device(&transport, vec![0xff, 0, 0xff, 0]).await;
    queue_for_device(&transport, b"{\"type\":\"hello\"}".to_vec()).await;
    queue_for_device(&transport, BackupAckFrame::ok("cd", None).to_json().unwrap()).await;
    queue_for_device(&transport, BackupAckFrame::ok("ab", None).to_json().unwrap()).await;

    let outcome = upload_backup_fragment(
        &transport,
        "s",
        "ab",
        &sample_artifacts(&[0xab]),
        &fast_options(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, UploadOutcome::Acknowledged);
    assert_eq!(transport.pending(Participant::Device), 0);
}

#[tokio::test]
async fn ack_arriving_later_is_picked_up() {
    let transport = InMemoryTransport::new();
    let coordinator = transport.clone();
    let responder = tokio::spawn(async move {
        loop {
            if let Some(frame) = coordinator.receive(Participant::Server).await.unwrap() {
                let upload = BackupShareFrame::parse(&frame).unwrap();
                let ack = BackupAckFrame::ok(upload.key_id, Some(upload.session_id));
                coordinator
                    .send(TransportMessage::to_device(ack.to_json().unwrap().into_bytes()))
                    .await
                    .unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let outcome = upload_backup_fragment(
        &transport,
        "s",
        "ab",
        &sample_artifacts(&[0xab]),
        &fast_options(),
    )
    .await
    .unwrap();
    responder.await.unwrap();
    assert_eq!(outcome, UploadOutcome::Acknowledged);
}

#[tokio::test]
async fn rejected_ack_carries_the_coordinator_reason() {
    let transport = InMemoryTransport::new();
    let ack = BackupAckFrame::rejected("ab", None, "threshold exceeds share count");
    queue_for_device(&transport, ack.to_json().unwrap()).await;

    let result = upload_backup_fragment(
        &transport,
        "s",
        "ab",
        &sample_artifacts(&[0xab]),
        &fast_options(),
    )
    .await;
    assert_matches!(result, Err(BackupError::Rejected(reason)) if reason == "threshold exceeds share count");
}

#[tokio::test]
async fn rejection_without_reason_uses_a_generic_message() {
    let transport = InMemoryTransport::new();
    queue_for_device(
        &transport,
        br#"{"type":"backup-share:ack","keyId":"ab","status":"error"}"#.to_vec(),
    )
    .await;

    let result = upload_backup_fragment(
        &transport,
        "s",
        "ab",
        &sample_artifacts(&[0xab]),
        &fast_options(),
    )
    .await;
    assert_matches!(result, Err(BackupError::Rejected(reason)) if reason == "Coordinator rejected backup fragment");
}

#[tokio::test]
async fn missing_ack_times_out() {
    let transport = InMemoryTransport::new();
    let options = UploadOptions {
        ack_timeout: Duration::from_millis(30),
        ..fast_options()
    };

    let result =
        upload_backup_fragment(&transport, "s", "ab", &sample_artifacts(&[0xab]), &options).await;
    assert_matches!(result, Err(BackupError::AckTimeout { key_id, waited_ms }) => {
        assert_eq!(key_id, "ab");
        assert!(waited_ms >= 30);
    });
    assert_eq!(transport.pending(Participant::Server), 1);
}

#[tokio::test]
async fn missing_fragment_index_sends_nothing() {
    let transport = InMemoryTransport::new();
    let options = UploadOptions {
        share_index: 7,
        ..fast_options()
    };

    let outcome =
        upload_backup_fragment(&transport, "s", "ab", &sample_artifacts(&[0xab]), &options)
            .await
            .unwrap();
    assert_eq!(outcome, UploadOutcome::Skipped);
    assert_eq!(transport.pending(Participant::Server), 0);
}
