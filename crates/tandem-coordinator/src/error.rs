//! Coordinator errors
//!
//! One enum per failure class: driving a protocol, parsing a handshake,
//! running the registry, and executing a session policy.

use tandem_core::{CoreError, EngineError, Participant, StorageError};
use tandem_transport::TransportError;
use thiserror::Error;

/// Result type for the round-trip driver
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Failures while pumping a DKG or signing run
#[derive(Debug, Error)]
pub enum DriverError {
    /// The round bound ran out before the protocol finished
    #[error("{intent} protocol stalled after {rounds} rounds without completing")]
    Stalled {
        /// `"dkg"` or `"sign"`
        intent: &'static str,
        /// Rounds attempted
        rounds: u32,
    },

    /// No frame arrived from the counterpart in time
    #[error("{intent} timed out waiting for the peer in round {round}")]
    PeerTimeout {
        /// `"dkg"` or `"sign"`
        intent: &'static str,
        /// Round that was waiting
        round: u32,
    },

    /// The mode needs a key share that was not supplied
    #[error("{0} keypair is required for this signing mode")]
    MissingKeypair(Participant),

    /// The primitive failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Relaying a frame failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Persisting a key share failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Signature normalization failed
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Rejected participant handshake. Every variant closes the socket with 1002.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The first frame is not JSON
    #[error("invalid handshake payload")]
    Malformed,

    /// The frame is JSON but not a hello
    #[error("unexpected frame type {0:?}")]
    UnexpectedType(String),

    /// `sessionId` is absent or empty
    #[error("handshake missing sessionId")]
    MissingSessionId,

    /// `role` is absent or not a participant
    #[error("invalid handshake role {0:?}")]
    InvalidRole(Option<String>),

    /// Sign and refresh name the key they operate on
    #[error("{0} intent missing keyId")]
    MissingKeyId(&'static str),

    /// The carried message does not decode
    #[error("invalid handshake message: {0}")]
    InvalidMessage(String),

    /// No frame arrived before the handshake deadline
    #[error("handshake timed out")]
    Timeout,
}

impl HandshakeError {
    /// Close reason sent to the rejected socket
    pub fn close_reason(&self) -> String {
        match self {
            HandshakeError::Malformed => "invalid handshake payload".to_string(),
            HandshakeError::Timeout => "handshake timeout".to_string(),
            _ => format!("invalid handshake contents: {self}"),
        }
    }
}

/// Result type for registry and server operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Failures of the session registry or its server
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Creating the session context failed
    #[error("Failed to open session context: {0}")]
    Context(#[from] EngineError),

    /// Configuration is unusable
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Binding or accepting failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A websocket could not be established
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for session policies
pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

/// Failures while a policy serves a session
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Running the protocol failed
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The server share for a key is not stored
    #[error("Missing server share for keyId {0}")]
    MissingShare(String),

    /// A sign session arrived without a message to sign
    #[error("sign intent for keyId {0} carries no message")]
    MissingMessage(String),

    /// Decoding a hex identifier failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The primitive failed outside a protocol run
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Storage failed outside a protocol run
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transport failed outside a protocol run
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
