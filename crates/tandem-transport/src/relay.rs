//! Socket relay transport
//!
//! Each participant may have one websocket bound. Frames read from a
//! participant's socket are queued for its peer; frames sent to a participant
//! go straight to its socket when one is open, and are queued otherwise.
//! Queued frames stay deliverable after the socket that produced them closes.

use crate::{MessageQueues, SocketInbound, SocketLink, TextSender, Transport, TransportResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tandem_core::{Participant, TransportMessage};

/// Transport bridging up to two websockets through per-recipient queues
#[derive(Debug, Clone, Default)]
pub struct SocketRelayTransport {
    queues: Arc<MessageQueues>,
    sockets: Arc<RwLock<[Option<SocketLink>; 2]>>,
}

impl SocketRelayTransport {
    /// Create a relay with no sockets bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `link` as `participant`'s socket and start relaying its frames.
    ///
    /// A previous binding is replaced; the old socket keeps running but its
    /// closure no longer unbinds anything.
    pub fn attach(&self, participant: Participant, link: SocketLink, mut inbound: SocketInbound) {
        let link_id = link.id();
        let previous = self.sockets.write()[participant.index()].replace(link.clone());
        if let Some(previous) = previous {
            tracing::debug!(
                %participant,
                old = %previous.id(),
                new = %link_id,
                "socket rebound"
            );
        }

        let queues = Arc::clone(&self.queues);
        let sockets = Arc::clone(&self.sockets);
        tokio::spawn(async move {
            let recipient = participant.peer();
            while let Some(frame) = inbound.next_frame().await {
                tracing::trace!(from = %participant, bytes = frame.len(), "relayed frame");
                queues.push(recipient, frame);
            }

            {
                let mut bound = sockets.write();
                let slot = &mut bound[participant.index()];
                if slot.as_ref().map(SocketLink::id) == Some(link_id) {
                    *slot = None;
                }
            }
            link.mark_closed();
            tracing::debug!(%participant, link = %link_id, "socket closed");
        });
    }

    /// Socket currently bound for `participant`
    pub fn socket(&self, participant: Participant) -> Option<SocketLink> {
        self.sockets.read()[participant.index()].clone()
    }

    /// Unbind `participant`'s socket without closing it
    pub fn detach(&self, participant: Participant) -> Option<SocketLink> {
        self.sockets.write()[participant.index()].take()
    }

    /// Close and unbind every socket
    pub fn close_all(&self, code: u16, reason: &str) {
        let links: Vec<SocketLink> = self.sockets.write().iter_mut().filter_map(Option::take).collect();
        for link in links {
            link.close(code, reason);
        }
    }

    /// Frames queued for `participant`
    pub fn pending(&self, participant: Participant) -> usize {
        self.queues.len(participant)
    }

    fn live_socket(&self, participant: Participant) -> Option<SocketLink> {
        self.socket(participant).filter(SocketLink::is_open)
    }
}

#[async_trait]
impl Transport for SocketRelayTransport {
    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let TransportMessage {
            participant,
            payload,
        } = message;
        if let Some(link) = self.live_socket(participant) {
            match link.send_binary(payload.clone()) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::debug!(%participant, error = %e, "socket send failed, queueing"),
            }
        }
        self.queues.push(participant, payload);
        Ok(())
    }

    async fn receive(&self, participant: Participant) -> TransportResult<Option<Vec<u8>>> {
        Ok(self.queues.pop(participant))
    }

    fn as_text_sender(&self) -> Option<&dyn TextSender> {
        Some(self)
    }
}

#[async_trait]
impl TextSender for SocketRelayTransport {
    async fn send_text(&self, recipient: Participant, text: &str) -> TransportResult<bool> {
        match self.live_socket(recipient) {
            Some(link) => {
                link.send_text(text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn has_live_socket(&self, participant: Participant) -> bool {
        self.live_socket(participant).is_some()
    }
}
