//! Participant and session identifiers
//!
//! Exactly two participants exist per session. A [`TransportMessage`] names
//! its *recipient*, never its sender.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two roles in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    /// The user's device holding the device-side share
    Device,
    /// The coordinator holding the server-side share
    Server,
}

impl Participant {
    /// Both roles, device first
    pub const ALL: [Participant; 2] = [Participant::Device, Participant::Server];

    /// The counterpart role
    pub fn peer(self) -> Participant {
        match self {
            Participant::Device => Participant::Server,
            Participant::Server => Participant::Device,
        }
    }

    /// Wire name of the role
    pub fn as_str(self) -> &'static str {
        match self {
            Participant::Device => "device",
            Participant::Server => "server",
        }
    }

    /// Stable slot index, used for per-role arrays
    pub fn index(self) -> usize {
        match self {
            Participant::Device => 0,
            Participant::Server => 1,
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Participant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Participant::Device),
            "server" => Ok(Participant::Server),
            other => Err(format!("unknown participant role: {other}")),
        }
    }
}

/// Opaque session identifier, conventionally hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hex-encode raw identifier bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An opaque protocol frame addressed to one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// Recipient of the payload
    pub participant: Participant,
    /// Opaque frame bytes
    pub payload: Vec<u8>,
}

impl TransportMessage {
    /// Address a payload to a recipient
    pub fn new(participant: Participant, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            participant,
            payload: payload.into(),
        }
    }

    /// Address a payload to the device
    pub fn to_device(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Participant::Device, payload)
    }

    /// Address a payload to the server
    pub fn to_server(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Participant::Server, payload)
    }
}
