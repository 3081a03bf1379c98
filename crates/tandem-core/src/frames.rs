//! JSON control frames
//!
//! Protocol frames are opaque bytes. The three frames here are the exception:
//! the participant handshake, the backup fragment upload and its
//! acknowledgement. Binary fields are hex strings on the wire.

use crate::backup::{BackupCiphertext, DeviceBackupArtifacts};
use crate::codec;
use crate::error::Result;
use crate::types::Participant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `type` of the participant handshake
pub const HELLO_TYPE: &str = "hello";
/// `type` of a backup fragment upload
pub const BACKUP_SHARE_TYPE: &str = "backup-share";
/// `type` of a backup fragment acknowledgement
pub const BACKUP_ACK_TYPE: &str = "backup-share:ack";

/// Declared purpose of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Distributed key generation
    Dkg,
    /// Threshold signing with an existing key
    Sign,
    /// Share refresh of an existing key
    Refresh,
}

impl IntentKind {
    /// Wire name of the intent
    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::Dkg => "dkg",
            IntentKind::Sign => "sign",
            IntentKind::Refresh => "refresh",
        }
    }

    /// Parse a wire name; unknown names yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dkg" => Some(IntentKind::Dkg),
            "sign" => Some(IntentKind::Sign),
            "refresh" => Some(IntentKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of the optional message carried by a sign handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageEncoding {
    /// Standard base64
    #[default]
    Base64,
    /// Lowercase hex
    Hex,
}

/// Participant handshake, the first frame on every coordinator socket.
///
/// Role and intent stay stringly typed so that a frame with an unknown role
/// still parses and can be rejected with a precise reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloFrame {
    /// Always `"hello"`
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Session being joined
    #[serde(default)]
    pub session_id: String,
    /// `"device"` or `"server"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Authorization token forwarded to the session policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `"dkg"`, `"sign"` or `"refresh"`; absent means DKG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Key identifier (hex), required for sign and refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Session id (hex) to bind into the protocol transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id_hint: Option<String>,
    /// Message to sign, encoded per `message_encoding`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Encoding of `message`; absent means base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_encoding: Option<MessageEncoding>,
}

impl HelloFrame {
    /// Handshake for `session_id` in `role` with no intent details
    pub fn new(session_id: impl Into<String>, role: Participant) -> Self {
        Self {
            frame_type: HELLO_TYPE.to_string(),
            session_id: session_id.into(),
            role: Some(role.as_str().to_string()),
            token: None,
            intent: None,
            key_id: None,
            session_id_hint: None,
            message: None,
            message_encoding: None,
        }
    }

    /// Declare the session intent
    pub fn with_intent(mut self, intent: IntentKind) -> Self {
        self.intent = Some(intent.as_str().to_string());
        self
    }

    /// Attach an authorization token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Attach a key identifier
    pub fn with_key_id(mut self, key_id: Option<String>) -> Self {
        self.key_id = key_id;
        self
    }

    /// Attach a session id hint
    pub fn with_session_id_hint(mut self, hint: Option<String>) -> Self {
        self.session_id_hint = hint;
        self
    }

    /// Attach the message to sign
    pub fn with_message(mut self, message: &[u8], encoding: MessageEncoding) -> Self {
        self.message = Some(match encoding {
            MessageEncoding::Base64 => codec::to_base64(message),
            MessageEncoding::Hex => codec::to_hex(message),
        });
        self.message_encoding = match encoding {
            MessageEncoding::Base64 => None,
            MessageEncoding::Hex => Some(MessageEncoding::Hex),
        };
        self
    }

    /// Decode the carried message, if any
    pub fn decode_message(&self) -> Result<Option<Vec<u8>>> {
        match &self.message {
            None => Ok(None),
            Some(text) => match self.message_encoding.unwrap_or_default() {
                MessageEncoding::Base64 => codec::from_base64(text).map(Some),
                MessageEncoding::Hex => codec::from_hex(text).map(Some),
            },
        }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Backup metadata with binary fields hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBackupCiphertext {
    /// Backup kind
    pub kind: String,
    /// Curve name
    pub curve: String,
    /// Sharing scheme
    pub scheme: String,
    /// Key identifier, hex
    pub key_id: String,
    /// Fragments required for restore
    pub threshold: u32,
    /// Fragments produced
    pub share_count: u32,
    /// Label, hex
    #[serde(default)]
    pub label: String,
    /// Ciphertext, hex
    pub blob: String,
}

impl From<&BackupCiphertext> for EncodedBackupCiphertext {
    fn from(ciphertext: &BackupCiphertext) -> Self {
        Self {
            kind: ciphertext.kind.clone(),
            curve: ciphertext.curve.clone(),
            scheme: ciphertext.scheme.clone(),
            key_id: codec::to_hex(&ciphertext.key_id),
            threshold: ciphertext.threshold,
            share_count: ciphertext.share_count,
            label: codec::to_hex(&ciphertext.label),
            blob: codec::to_hex(&ciphertext.blob),
        }
    }
}

impl EncodedBackupCiphertext {
    /// Decode the hex fields back into bytes
    pub fn decode(&self) -> Result<BackupCiphertext> {
        Ok(BackupCiphertext {
            kind: self.kind.clone(),
            curve: self.curve.clone(),
            scheme: self.scheme.clone(),
            key_id: codec::from_hex(&self.key_id)?,
            threshold: self.threshold,
            share_count: self.share_count,
            label: codec::from_hex(&self.label)?,
            blob: codec::from_hex(&self.blob)?,
        })
    }
}

/// Upload of one backup fragment to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupShareFrame {
    /// Always `"backup-share"`
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Session the fragment belongs to
    pub session_id: String,
    /// Wallet key identifier
    pub key_id: String,
    /// Backup metadata
    pub ciphertext: EncodedBackupCiphertext,
    /// Fragment, hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
    /// Fragment, hex (duplicate of `share` for older readers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    /// Index of the fragment within the backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_index: Option<u32>,
}

impl BackupShareFrame {
    /// Frame carrying fragment `share_index` of `backup`.
    ///
    /// Returns `None` when no fragment exists at that index.
    pub fn from_artifacts(
        session_id: impl Into<String>,
        key_id: impl Into<String>,
        backup: &DeviceBackupArtifacts,
        share_index: usize,
    ) -> Option<Self> {
        let share = backup.share(share_index)?;
        let share_hex = codec::to_hex(share);
        Some(Self {
            frame_type: BACKUP_SHARE_TYPE.to_string(),
            session_id: session_id.into(),
            key_id: key_id.into(),
            ciphertext: EncodedBackupCiphertext::from(&backup.ciphertext),
            share: Some(share_hex.clone()),
            fragment: Some(share_hex),
            share_index: u32::try_from(share_index).ok(),
        })
    }

    /// Parse a frame, returning `None` for anything that is not a backup upload
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let parsed: Self = serde_json::from_slice(frame).ok()?;
        (parsed.frame_type == BACKUP_SHARE_TYPE).then_some(parsed)
    }

    /// Decoded fragment bytes, from `share` or else `fragment`
    pub fn decode_share(&self) -> Result<Option<Vec<u8>>> {
        match self.share.as_deref().or(self.fragment.as_deref()) {
            Some(hex) => codec::from_hex(hex).map(Some),
            None => Ok(None),
        }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Acknowledgement of a backup fragment upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupAckFrame {
    /// Always `"backup-share:ack"`
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Key identifier the ack refers to
    pub key_id: String,
    /// Session the ack refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// `"ok"` or `"error"`; absent means ok
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Failure reason when `status` is not ok
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupAckFrame {
    /// Successful acknowledgement
    pub fn ok(key_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            frame_type: BACKUP_ACK_TYPE.to_string(),
            key_id: key_id.into(),
            session_id,
            status: Some("ok".to_string()),
            error: None,
        }
    }

    /// Rejection carrying `error`
    pub fn rejected(
        key_id: impl Into<String>,
        session_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            frame_type: BACKUP_ACK_TYPE.to_string(),
            key_id: key_id.into(),
            session_id,
            status: Some("error".to_string()),
            error: Some(error.into()),
        }
    }

    /// Parse a frame, returning `None` for anything that is not an ack
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let parsed: Self = serde_json::from_slice(frame).ok()?;
        (parsed.frame_type == BACKUP_ACK_TYPE).then_some(parsed)
    }

    /// Whether the coordinator accepted the fragment
    pub fn is_ok(&self) -> bool {
        matches!(self.status.as_deref(), None | Some("ok"))
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> DeviceBackupArtifacts {
        DeviceBackupArtifacts {
            ciphertext: BackupCiphertext {
                kind: "device-backup".into(),
                curve: "secp256k1".into(),
                scheme: "shamir".into(),
                key_id: vec![0xaa, 0xbb],
                threshold: 2,
                share_count: 3,
                label: b"label".to_vec(),
                blob: vec![1, 2, 3],
            },
            shares: vec![vec![0x10], vec![0x11], vec![0x12]],
        }
    }

    #[test]
    fn hello_wire_shape() {
        let hello = HelloFrame::new("abcd", Participant::Device)
            .with_intent(IntentKind::Sign)
            .with_key_id(Some("k1".into()))
            .with_message(b"hi", MessageEncoding::Hex);
        let value: serde_json::Value = serde_json::from_str(&hello.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "hello");
        assert_eq!(value["sessionId"], "abcd");
        assert_eq!(value["role"], "device");
        assert_eq!(value["intent"], "sign");
        assert_eq!(value["keyId"], "k1");
        assert_eq!(value["message"], "6869");
        assert_eq!(value["messageEncoding"], "hex");
        assert!(value.get("token").is_none());
        assert_eq!(hello.decode_message().unwrap(), Some(b"hi".to_vec()));
    }

    #[test]
    fn hello_message_defaults_to_base64() {
        let hello = HelloFrame::new("s", Participant::Device)
            .with_message(&[1, 2, 3], MessageEncoding::Base64);
        assert_eq!(hello.message_encoding, None);
        assert_eq!(hello.decode_message().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn backup_share_frame_encodes_binary_as_hex() {
        let frame = BackupShareFrame::from_artifacts("sid", "key", &artifacts(), 1).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "backup-share");
        assert_eq!(value["share"], "11");
        assert_eq!(value["fragment"], "11");
        assert_eq!(value["shareIndex"], 1);
        assert_eq!(value["ciphertext"]["keyId"], "aabb");
        assert_eq!(value["ciphertext"]["shareCount"], 3);
        assert_eq!(value["ciphertext"]["label"], "6c6162656c");

        let parsed = BackupShareFrame::parse(frame.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed.ciphertext.decode().unwrap(), artifacts().ciphertext);
        assert_eq!(parsed.decode_share().unwrap(), Some(vec![0x11]));
    }

    #[test]
    fn missing_share_index_yields_no_frame() {
        assert!(BackupShareFrame::from_artifacts("sid", "key", &artifacts(), 5).is_none());
    }

    #[test]
    fn ack_parsing_filters_other_frames() {
        let ok = BackupAckFrame::ok("k", None);
        assert!(BackupAckFrame::parse(ok.to_json().unwrap().as_bytes())
            .unwrap()
            .is_ok());

        let rejected = BackupAckFrame::rejected("k", None, "disk full");
        let parsed = BackupAckFrame::parse(rejected.to_json().unwrap().as_bytes()).unwrap();
        assert!(!parsed.is_ok());
        assert_eq!(parsed.error.as_deref(), Some("disk full"));

        assert!(BackupAckFrame::parse(b"\x00\x01binary").is_none());
        assert!(BackupAckFrame::parse(br#"{"type":"hello","keyId":"k"}"#).is_none());
        assert!(BackupAckFrame::parse(br#"{"type":"backup-share:ack"}"#).is_none());
    }
}
