//! Device connection to the coordinator
//!
//! The device opens one websocket, sends its hello and then binds the socket
//! to a [`SocketRelayTransport`] as the *server* participant: frames the
//! coordinator sends arrive in the device queue, and frames sent to the
//! server go out over the socket.

use crate::WalletResult;
use rand::RngCore;
use std::sync::Arc;
use tandem_core::{codec, HelloFrame, IntentKind, MessageEncoding, Participant};
use tandem_transport::{connect_socket, SocketLink, SocketRelayTransport, CLOSE_NORMAL};

/// Length of generated session ids, in bytes
pub const SESSION_ID_BYTES: usize = 16;

/// Handshake contents for [`connect_to_coordinator`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Coordinator websocket URL
    pub url: String,
    /// Authorization token
    pub token: Option<String>,
    /// Session intent
    pub intent: IntentKind,
    /// Key id (hex); required by the coordinator for sign and refresh
    pub key_id: Option<String>,
    /// Session id; a random one is generated when absent
    pub session_id: Option<String>,
    /// Session id (hex) bound into the protocol transcript
    pub session_id_hint: Option<String>,
    /// Message to sign
    pub message: Option<Vec<u8>>,
    /// Encoding of `message` on the wire
    pub message_encoding: MessageEncoding,
}

impl ConnectOptions {
    /// DKG handshake against `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            intent: IntentKind::Dkg,
            key_id: None,
            session_id: None,
            session_id_hint: None,
            message: None,
            message_encoding: MessageEncoding::Base64,
        }
    }
}

/// Random hex session id
pub fn random_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    codec::to_hex(&bytes)
}

/// An open device session
#[derive(Debug)]
pub struct CoordinatorConnection {
    /// Relay with the coordinator socket bound as the server participant
    pub transport: Arc<SocketRelayTransport>,
    /// Session id sent in the hello
    pub session_id: String,
    link: SocketLink,
}

impl CoordinatorConnection {
    /// Whether the coordinator socket is still open
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Unbind and close the socket. Safe to call more than once.
    pub fn close(&self) {
        self.transport.detach(Participant::Server);
        if self.link.is_open() {
            self.link.close(CLOSE_NORMAL, "session complete");
        }
        tracing::debug!(session_id = %self.session_id, "coordinator connection closed");
    }
}

/// Open a session with the coordinator at `options.url`
pub async fn connect_to_coordinator(options: ConnectOptions) -> WalletResult<CoordinatorConnection> {
    let session_id = options.session_id.unwrap_or_else(random_session_id);
    let (link, inbound) = connect_socket(&options.url).await?;

    let mut hello = HelloFrame::new(session_id.as_str(), Participant::Device)
        .with_intent(options.intent)
        .with_token(options.token)
        .with_key_id(options.key_id)
        .with_session_id_hint(options.session_id_hint);
    if let Some(message) = &options.message {
        hello = hello.with_message(message, options.message_encoding);
    }
    tracing::debug!(session_id = %session_id, intent = %options.intent, "sending hello");
    link.send_text(hello.to_json()?)?;

    let transport = Arc::new(SocketRelayTransport::new());
    transport.attach(Participant::Server, link.clone(), inbound);
    tracing::info!(session_id = %session_id, "attached to coordinator as server peer");

    Ok(CoordinatorConnection {
        transport,
        session_id,
        link,
    })
}
