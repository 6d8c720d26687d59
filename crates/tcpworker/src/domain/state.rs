//! Connection lifecycle states observable by the consumer.

use std::fmt;

/// Where the background connection task currently is in its lifecycle.
///
/// ```text
///            decode failure
/// Connected ───────────────▶ Reconnecting ──┐ attempt failed:
///     ▲                          │   ▲      │ sleep, retry
///     └──── attempt succeeded ───┘   └──────┘
///
/// any state ── shutdown / consumer gone ──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A connection is current and being decoded.
    Connected,
    /// The last connection was lost; dial + handshake is being retried.
    Reconnecting,
    /// The background task has stopped.  Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while a connection is current.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::Closed.is_connected());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
