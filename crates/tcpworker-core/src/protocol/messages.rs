//! Protocol message types.
//!
//! The payload carried in either direction is an arbitrary JSON object.  The
//! only message with a fixed shape is the handshake, which is written once
//! right after every successful TCP connect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

/// A single message on the wire: a JSON object with string keys.
///
/// No schema is enforced; payload semantics belong to the caller.
pub type Message = serde_json::Map<String, serde_json::Value>;

/// Wire token for [`Role::Client`].
pub const ROLE_CLIENT_TOKEN: &str = "1";

/// Wire token for [`Role::Worker`].
pub const ROLE_WORKER_TOKEN: &str = "2";

// ── Role ──────────────────────────────────────────────────────────────────────

/// The role a connection declares in its handshake.
///
/// The role is informational to the server; the client never interprets it.
/// On the wire it is serialized as the string token `"1"` or `"2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    /// A requesting client (`"1"`).
    #[serde(rename = "1")]
    Client,
    /// A service worker (`"2"`).
    #[serde(rename = "2")]
    #[default]
    Worker,
}

impl Role {
    /// Returns the wire token for this role.
    pub fn wire_token(self) -> &'static str {
        match self {
            Role::Client => ROLE_CLIENT_TOKEN,
            Role::Worker => ROLE_WORKER_TOKEN,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    /// Accepts the human-readable names (`client`, `worker`, any case) as
    /// well as the raw wire tokens (`1`, `2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ROLE_CLIENT_TOKEN => Ok(Role::Client),
            ROLE_WORKER_TOKEN => Ok(Role::Worker),
            other if other.eq_ignore_ascii_case("client") => Ok(Role::Client),
            other if other.eq_ignore_ascii_case("worker") => Ok(Role::Worker),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// The identification message sent immediately after every successful dial.
///
/// Serializes to exactly two keys:
///
/// ```text
/// {"ServiceName":"<name>","Type":"1"|"2"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Logical name presented to the server.
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    /// Declared role.
    #[serde(rename = "Type")]
    pub role: Role,
}

impl HandshakeMessage {
    /// Builds a handshake for `service_name` declaring `role`.
    pub fn new(service_name: impl Into<String>, role: Role) -> Self {
        Self {
            service_name: service_name.into(),
            role,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
