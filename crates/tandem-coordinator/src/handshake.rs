//! Participant handshake
//!
//! The first frame on every socket is a hello. It is validated completely
//! before any session state exists, so a rejected socket leaves no trace.

use crate::HandshakeError;
use tandem_core::{HelloFrame, IntentKind, Participant, SessionId, HELLO_TYPE};

/// What a session is for, with the parameters each intent needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIntent {
    /// Generate a new key
    Dkg {
        /// Requested key identifier, hex
        key_id: Option<String>,
        /// Session id to bind into the transcript, hex
        session_id_hint: Option<String>,
    },
    /// Sign with an existing key
    Sign {
        /// Key identifier, hex
        key_id: String,
        /// Session id to bind into the transcript, hex
        session_id_hint: Option<String>,
        /// Bytes to sign, when the device sent them
        message: Option<Vec<u8>>,
    },
    /// Refresh the shares of an existing key
    Refresh {
        /// Key identifier, hex
        key_id: String,
        /// Session id to bind into the transcript, hex
        session_id_hint: Option<String>,
    },
}

impl SessionIntent {
    /// Intent kind
    pub fn kind(&self) -> IntentKind {
        match self {
            SessionIntent::Dkg { .. } => IntentKind::Dkg,
            SessionIntent::Sign { .. } => IntentKind::Sign,
            SessionIntent::Refresh { .. } => IntentKind::Refresh,
        }
    }

    /// Key identifier, if the intent carries one
    pub fn key_id(&self) -> Option<&str> {
        match self {
            SessionIntent::Dkg { key_id, .. } => key_id.as_deref(),
            SessionIntent::Sign { key_id, .. } | SessionIntent::Refresh { key_id, .. } => {
                Some(key_id)
            }
        }
    }

    /// Session id hint, if any
    pub fn session_id_hint(&self) -> Option<&str> {
        match self {
            SessionIntent::Dkg {
                session_id_hint, ..
            }
            | SessionIntent::Sign {
                session_id_hint, ..
            }
            | SessionIntent::Refresh {
                session_id_hint, ..
            } => session_id_hint.as_deref(),
        }
    }
}

impl Default for SessionIntent {
    fn default() -> Self {
        SessionIntent::Dkg {
            key_id: None,
            session_id_hint: None,
        }
    }
}

/// A validated hello
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Session being joined
    pub session_id: SessionId,
    /// Role of the connecting socket
    pub role: Participant,
    /// Authorization token, passed through to the policy
    pub token: Option<String>,
    /// Resolved intent
    pub intent: SessionIntent,
}

/// Validate the first frame of a socket
pub fn parse_handshake(frame: &[u8]) -> Result<Handshake, HandshakeError> {
    let hello: HelloFrame = serde_json::from_slice(frame).map_err(|_| HandshakeError::Malformed)?;

    if hello.frame_type != HELLO_TYPE {
        return Err(HandshakeError::UnexpectedType(hello.frame_type));
    }
    if hello.session_id.is_empty() {
        return Err(HandshakeError::MissingSessionId);
    }
    let role = hello
        .role
        .as_deref()
        .and_then(|r| r.parse::<Participant>().ok())
        .ok_or_else(|| HandshakeError::InvalidRole(hello.role.clone()))?;

    let intent = resolve_intent(&hello)?;
    Ok(Handshake {
        session_id: SessionId::new(hello.session_id),
        role,
        token: hello.token,
        intent,
    })
}

fn resolve_intent(hello: &HelloFrame) -> Result<SessionIntent, HandshakeError> {
    let key_id = hello.key_id.clone().filter(|k| !k.is_empty());
    let session_id_hint = hello.session_id_hint.clone();

    // Unknown intents fall back to DKG.
    match hello.intent.as_deref().and_then(IntentKind::parse) {
        Some(IntentKind::Sign) => {
            let key_id = key_id.ok_or(HandshakeError::MissingKeyId("sign"))?;
            let message = hello
                .decode_message()
                .map_err(|e| HandshakeError::InvalidMessage(e.to_string()))?;
            Ok(SessionIntent::Sign {
                key_id,
                session_id_hint,
                message,
            })
        }
        Some(IntentKind::Refresh) => Ok(SessionIntent::Refresh {
            key_id: key_id.ok_or(HandshakeError::MissingKeyId("refresh"))?,
            session_id_hint,
        }),
        Some(IntentKind::Dkg) | None => Ok(SessionIntent::Dkg {
            key_id,
            session_id_hint,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tandem_core::MessageEncoding;

    #[test]
    fn dkg_is_the_default_intent() {
        let handshake =
            parse_handshake(br#"{"type":"hello","sessionId":"s1","role":"device","token":"t"}"#)
                .unwrap();
        assert_eq!(handshake.role, Participant::Device);
        assert_eq!(handshake.token.as_deref(), Some("t"));
        assert_eq!(handshake.intent, SessionIntent::default());

        let unknown = parse_handshake(
            br#"{"type":"hello","sessionId":"s1","role":"server","intent":"rotate","keyId":"ab"}"#,
        )
        .unwrap();
        assert_eq!(unknown.intent.kind(), IntentKind::Dkg);
        assert_eq!(unknown.intent.key_id(), Some("ab"));
    }

    #[test]
    fn sign_carries_key_and_message() {
        let hello = HelloFrame::new("s2", Participant::Device)
            .with_intent(IntentKind::Sign)
            .with_key_id(Some("abcd".into()))
            .with_session_id_hint(Some("0102".into()))
            .with_message(&[7, 7], MessageEncoding::Hex);
        let handshake = parse_handshake(hello.to_json().unwrap().as_bytes()).unwrap();
        assert_matches!(
            handshake.intent,
            SessionIntent::Sign { ref key_id, ref message, .. }
                if key_id == "abcd" && message.as_deref() == Some(&[7u8, 7][..])
        );
        assert_eq!(handshake.intent.session_id_hint(), Some("0102"));
    }

    #[test]
    fn invalid_handshakes_are_classified() {
        assert_eq!(parse_handshake(b"not json"), Err(HandshakeError::Malformed));
        assert_matches!(
            parse_handshake(br#"{"type":"bye","sessionId":"s","role":"device"}"#),
            Err(HandshakeError::UnexpectedType(t)) if t == "bye"
        );
        assert_eq!(
            parse_handshake(br#"{"type":"hello","sessionId":"","role":"device"}"#),
            Err(HandshakeError::MissingSessionId)
        );
        assert_eq!(
            parse_handshake(br#"{"type":"hello","sessionId":"s","role":"guardian"}"#),
            Err(HandshakeError::InvalidRole(Some("guardian".into())))
        );
        assert_eq!(
            parse_handshake(br#"{"type":"hello","sessionId":"s"}"#),
            Err(HandshakeError::InvalidRole(None))
        );
        assert_eq!(
            parse_handshake(br#"{"type":"hello","sessionId":"s","role":"device","intent":"sign"}"#),
            Err(HandshakeError::MissingKeyId("sign"))
        );
        assert_eq!(
            parse_handshake(
                br#"{"type":"hello","sessionId":"s","role":"device","intent":"refresh","keyId":""}"#
            ),
            Err(HandshakeError::MissingKeyId("refresh"))
        );
    }
}
