//! In-memory transport
//!
//! Both participants live in the same process and share one pair of queues.

use crate::{MessageQueues, Transport, TransportResult};
use async_trait::async_trait;
use std::sync::Arc;
use tandem_core::{Participant, TransportMessage};

/// Queue-only transport for tests and the local driver mode
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    queues: Arc<MessageQueues>,
}

impl InMemoryTransport {
    /// Create a transport with empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames waiting for `participant`
    pub fn pending(&self, participant: Participant) -> usize {
        self.queues.len(participant)
    }

    /// Discard and return everything waiting for `participant`
    pub fn drain(&self, participant: Participant) -> Vec<Vec<u8>> {
        self.queues.drain(participant)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        tracing::trace!(
            recipient = %message.participant,
            bytes = message.payload.len(),
            "queued frame"
        );
        self.queues.push(message.participant, message.payload);
        Ok(())
    }

    async fn receive(&self, participant: Participant) -> TransportResult<Option<Vec<u8>>> {
        Ok(self.queues.pop(participant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_only_their_recipient() {
        let transport = InMemoryTransport::new();
        transport
            .send(TransportMessage::to_server(vec![1]))
            .await
            .unwrap();
        transport
            .send(TransportMessage::to_server(vec![2]))
            .await
            .unwrap();
        transport
            .send(TransportMessage::to_device(vec![3]))
            .await
            .unwrap();

        assert_eq!(transport.receive(Participant::Server).await.unwrap(), Some(vec![1]));
        assert_eq!(transport.receive(Participant::Device).await.unwrap(), Some(vec![3]));
        assert_eq!(transport.receive(Participant::Server).await.unwrap(), Some(vec![2]));
        assert_eq!(transport.receive(Participant::Server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_queues() {
        let a = InMemoryTransport::new();
        let b = a.clone();
        a.send(TransportMessage::to_device(vec![9])).await.unwrap();
        assert_eq!(b.pending(Participant::Device), 1);
        assert_eq!(b.drain(Participant::Device), vec![vec![9]]);
        assert_eq!(a.pending(Participant::Device), 0);
    }
}
