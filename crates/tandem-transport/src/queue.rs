//! Per-recipient FIFO queues

use parking_lot::Mutex;
use std::collections::VecDeque;
use tandem_core::Participant;

/// One FIFO queue per participant.
///
/// Pushing and popping are short critical sections and never await, so a
/// blocking mutex is enough even when shared across tasks.
#[derive(Debug, Default)]
pub struct MessageQueues {
    slots: Mutex<[VecDeque<Vec<u8>>; 2]>,
}

impl MessageQueues {
    /// Empty queues for both participants
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame for `recipient`
    pub fn push(&self, recipient: Participant, payload: Vec<u8>) {
        self.slots.lock()[recipient.index()].push_back(payload);
    }

    /// Oldest frame for `recipient`, if any
    pub fn pop(&self, recipient: Participant) -> Option<Vec<u8>> {
        self.slots.lock()[recipient.index()].pop_front()
    }

    /// Frames waiting for `recipient`
    pub fn len(&self, recipient: Participant) -> usize {
        self.slots.lock()[recipient.index()].len()
    }

    /// True when nothing waits for `recipient`
    pub fn is_empty(&self, recipient: Participant) -> bool {
        self.len(recipient) == 0
    }

    /// Remove and return every frame waiting for `recipient`
    pub fn drain(&self, recipient: Participant) -> Vec<Vec<u8>> {
        self.slots.lock()[recipient.index()].drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn per_recipient_order_is_preserved(
            ops in proptest::collection::vec((any::<bool>(), proptest::collection::vec(any::<u8>(), 0..8)), 0..64)
        ) {
            let queues = MessageQueues::new();
            let mut expected_device = Vec::new();
            let mut expected_server = Vec::new();

            for (to_device, payload) in ops {
                if to_device {
                    queues.push(Participant::Device, payload.clone());
                    expected_device.push(payload);
                } else {
                    queues.push(Participant::Server, payload.clone());
                    expected_server.push(payload);
                }
            }

            prop_assert_eq!(queues.drain(Participant::Device), expected_device);
            let mut server = Vec::new();
            while let Some(frame) = queues.pop(Participant::Server) {
                server.push(frame);
            }
            prop_assert_eq!(server, expected_server);
        }
    }

    #[test]
    fn empty_pop_returns_none() {
        let queues = MessageQueues::new();
        assert!(queues.pop(Participant::Device).is_none());
        assert!(queues.is_empty(Participant::Server));
    }
}
