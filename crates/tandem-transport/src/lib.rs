//! Tandem Transport
//!
//! Moves opaque protocol frames between the two participants of a session.
//! [`InMemoryTransport`] serves tests and the local driver mode, while
//! [`SocketRelayTransport`] bridges one websocket per participant and queues
//! whatever arrives for the counterpart.
//!
//! Both deliver frames per recipient in FIFO order and never block on an
//! empty queue: callers poll.

pub mod error;
pub mod memory;
pub mod queue;
pub mod relay;
pub mod socket;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use memory::InMemoryTransport;
pub use queue::MessageQueues;
pub use relay::SocketRelayTransport;
pub use socket::{accept_socket, connect_socket, SocketInbound, SocketLink, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR};
pub use traits::{TextSender, Transport};
