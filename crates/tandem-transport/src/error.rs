//! Transport errors

use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised while moving frames between participants
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket is closed or its writer has stopped
    #[error("Socket not open: {0}")]
    SocketNotOpen(String),

    /// Opening a websocket failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A websocket operation failed
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// An operation did not finish in time
    #[error("Transport timeout: {0}")]
    Timeout(String),

    /// Socket-level I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(error.to_string())
    }
}
