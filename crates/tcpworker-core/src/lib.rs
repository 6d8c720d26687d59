//! # tcpworker-core
//!
//! Wire protocol shared by everything that speaks to a tcpworker server:
//! the message type, the role enumeration, the identification handshake,
//! and the streaming JSON codec.
//!
//! This crate has no dependency on sockets or an async runtime.
//!
//! # Protocol overview
//!
//! After the TCP connection is established the client writes one handshake
//! object naming itself and its role:
//!
//! ```text
//! {"ServiceName":"billing","Type":"2"}
//! ```
//!
//! From then on both directions carry JSON objects back to back with no
//! delimiter.  A reader finds message boundaries by parsing exactly one JSON
//! value at a time (see [`protocol::codec`]).

pub mod protocol;

pub use protocol::codec::{decode_message, encode_message, MessageBuffer, ProtocolError};
pub use protocol::messages::{HandshakeMessage, Message, Role};
