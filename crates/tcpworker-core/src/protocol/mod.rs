//! Protocol module containing message types and the streaming JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_message, encode_handshake, encode_message, MessageBuffer, ProtocolError,
    DEFAULT_MAX_MESSAGE_BYTES,
};
pub use messages::*;
