//! Transport trait definitions

use crate::TransportResult;
use async_trait::async_trait;
use std::sync::Arc;
use tandem_core::{Participant, TransportMessage};

/// Delivery of opaque frames addressed by recipient
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message.payload` to `message.participant`
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Take the oldest frame waiting for `participant` without blocking
    async fn receive(&self, participant: Participant) -> TransportResult<Option<Vec<u8>>>;

    /// Raw text capability, for transports backed by live sockets
    fn as_text_sender(&self) -> Option<&dyn TextSender> {
        None
    }
}

/// Out-of-band text frames on a socket-backed transport
#[async_trait]
pub trait TextSender: Send + Sync {
    /// Write `text` as a text frame to the socket bound for `recipient`.
    ///
    /// Returns `false` when no open socket is bound.
    async fn send_text(&self, recipient: Participant, text: &str) -> TransportResult<bool>;

    /// Whether an open socket is bound for `participant`
    fn has_live_socket(&self, participant: Participant) -> bool;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        (**self).send(message).await
    }

    async fn receive(&self, participant: Participant) -> TransportResult<Option<Vec<u8>>> {
        (**self).receive(participant).await
    }

    fn as_text_sender(&self) -> Option<&dyn TextSender> {
        (**self).as_text_sender()
    }
}
