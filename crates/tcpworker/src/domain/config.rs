//! Worker configuration types.
//!
//! [`WorkerConfig`] carries everything a [`Worker`](crate::infrastructure::network::Worker)
//! needs to dial, identify itself, and recover from a lost connection.  It is
//! a plain struct: the binary fills it from the CLI and an optional TOML file,
//! tests build it directly.

use std::time::Duration;

use tcpworker_core::protocol::DEFAULT_MAX_MESSAGE_BYTES;
use tcpworker_core::Role;

/// Fixed delay between reconnect attempts unless configured otherwise.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Default capacity of the inbound message channel created by the binary.
pub const DEFAULT_INBOUND_BUFFER: usize = 128;

/// All runtime configuration for one worker connection.
///
/// # Example
///
/// ```rust
/// use tcpworker::domain::WorkerConfig;
/// use tcpworker_core::Role;
///
/// let cfg = WorkerConfig::new("billing", "10.0.0.5:7000");
/// assert_eq!(cfg.role, Role::Worker);
/// assert_eq!(cfg.reconnect_delay.as_secs(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Logical name presented to the server in every handshake.
    pub name: String,

    /// Server address in `host:port` form.  Resolved on every dial, so a
    /// hostname may move between reconnects.
    pub server_addr: String,

    /// Role declared in the handshake.
    pub role: Role,

    /// Pause after each failed reconnect attempt.  Constant: no backoff and
    /// no jitter.
    pub reconnect_delay: Duration,

    /// Largest single inbound message accepted before the connection is
    /// considered corrupt.
    pub max_message_bytes: usize,

    /// Capacity of the inbound channel.  Only used by callers that let the
    /// config size the channel (the binary does).
    pub inbound_buffer: usize,
}

impl WorkerConfig {
    /// Builds a config for `name` at `server_addr` with every other field at
    /// its default.
    pub fn new(name: impl Into<String>, server_addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_addr: server_addr.into(),
            role: Role::Worker,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            inbound_buffer: DEFAULT_INBOUND_BUFFER,
        }
    }

    /// Sets the handshake role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the delay between reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the per-message size limit.
    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
