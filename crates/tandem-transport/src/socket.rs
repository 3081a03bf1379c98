//! Websocket links
//!
//! A websocket is split once: the sink half moves into a writer task fed by
//! an unbounded channel ([`SocketLink`]), the stream half stays with whoever
//! reads it ([`SocketInbound`]). Links are cheap to clone and can be shared
//! between the relay transport and the session registry.

use crate::{TransportError, TransportResult};
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Protocol violation, used for rejected handshakes
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Write half of a websocket
#[derive(Debug, Clone)]
pub struct SocketLink {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

/// Read half of a websocket
pub struct SocketInbound {
    link_id: Uuid,
    stream: BoxStream<'static, Result<Message, tungstenite::Error>>,
}

impl std::fmt::Debug for SocketInbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketInbound")
            .field("link_id", &self.link_id)
            .finish_non_exhaustive()
    }
}

impl SocketLink {
    /// Split `ws` and spawn its writer task
    pub fn spawn<S>(ws: WebSocketStream<S>) -> (SocketLink, SocketInbound)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, stream) = ws.split();
        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed_rx) = watch::channel(false);

        let link = SocketLink {
            id: Uuid::new_v4(),
            outbound,
            open: Arc::new(AtomicBool::new(true)),
            closed_tx: Arc::new(closed_tx),
            closed_rx,
        };

        // The writer holds no sender, so it ends once every link clone is dropped.
        let id = link.id;
        let open = Arc::clone(&link.open);
        let closed = Arc::clone(&link.closed_tx);
        let mut closed_signal = link.closed_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    next = rx.recv() => {
                        let Some(message) = next else { break };
                        let is_close = matches!(message, Message::Close(_));
                        if let Err(e) = sink.send(message).await {
                            tracing::debug!(link = %id, error = %e, "socket write failed");
                            break;
                        }
                        if is_close {
                            break;
                        }
                    }
                    changed = closed_signal.changed() => {
                        if changed.is_err() || *closed_signal.borrow() {
                            break;
                        }
                    }
                }
            }
            open.store(false, Ordering::Release);
            closed.send_replace(true);
        });

        let inbound = SocketInbound {
            link_id: link.id,
            stream: stream.boxed(),
        };
        (link, inbound)
    }

    /// Unique id of this socket
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether frames can still be written
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Write a binary frame
    pub fn send_binary(&self, payload: Vec<u8>) -> TransportResult<()> {
        self.send(Message::Binary(payload))
    }

    /// Write a text frame
    pub fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        self.send(Message::Text(text.into()))
    }

    fn send(&self, message: Message) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::SocketNotOpen(format!("socket {} is closed", self.id)));
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::SocketNotOpen(format!("socket {} writer stopped", self.id)))
    }

    /// Send a close frame and stop accepting writes. Closing twice is a no-op.
    pub fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            if let Err(e) = self.outbound.send(Message::Close(Some(frame))) {
                tracing::debug!(link = %self.id, error = %e, "close frame dropped, writer stopped");
            }
        }
    }

    /// Record that the socket is gone
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
        self.closed_tx.send_replace(true);
    }

    /// Resolve once the socket has closed from either side
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl SocketInbound {
    /// Id of the link this stream belongs to
    pub fn link_id(&self) -> Uuid {
        self.link_id
    }

    /// Next data frame as bytes.
    ///
    /// Binary and text frames are returned; control frames are skipped.
    /// `None` means the peer closed or the socket failed.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        while let Some(item) = self.stream.next().await {
            match item {
                Ok(Message::Binary(data)) => return Some(data),
                Ok(Message::Text(text)) => return Some(text.into_bytes()),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(link = %self.link_id, error = %e, "socket read failed");
                    return None;
                }
            }
        }
        None
    }
}

/// Open a client websocket to `url`
pub async fn connect_socket(url: &str) -> TransportResult<(SocketLink, SocketInbound)> {
    let (ws, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket connect failed: {e}")))?;
    tracing::debug!(url, status = %response.status(), "websocket connected");
    Ok(SocketLink::spawn(ws))
}

/// Complete the server side of a websocket handshake on `stream`
pub async fn accept_socket(stream: TcpStream) -> TransportResult<(SocketLink, SocketInbound)> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket accept failed: {e}")))?;
    Ok(SocketLink::spawn(ws))
}
