//! Streaming JSON codec for the tcpworker wire protocol.
//!
//! Wire format:
//! ```text
//! {"ServiceName":"<name>","Type":"2"}{"k":"v"}{"k":1}...
//! ```
//! Messages are compact JSON objects written back to back.  There is no
//! delimiter, length prefix, or framing byte: the end of a message is the
//! closing brace that balances its opening brace.  Whitespace between
//! objects is tolerated on decode and never produced on encode.
//!
//! Both peers must therefore consume exactly one JSON value at a time from
//! the byte stream.  [`decode_message`] does this for a byte slice;
//! [`MessageBuffer`] wraps it for a socket that delivers bytes in arbitrary
//! chunks.

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{HandshakeMessage, Message};

/// Default upper bound on the size of one buffered message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer does not yet hold one complete JSON value.
    #[error("insufficient data: {available} bytes buffered, message incomplete")]
    InsufficientData { available: usize },

    /// The bytes are not a JSON object (syntax error or wrong value type).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A single message grew beyond the configured limit.
    #[error("message exceeds {limit} bytes ({size} bytes buffered)")]
    MessageTooLarge { size: usize, limit: usize },

    /// A value could not be serialized to JSON.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A role string is neither a known name nor a wire token.
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes any serializable value as compact JSON bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails (for example a
/// map with non-string keys).
///
/// # Examples
///
/// ```rust
/// use tcpworker_core::protocol::{decode_message, encode_message, Message};
///
/// let mut msg = Message::new();
/// msg.insert("x".into(), "y".into());
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes, br#"{"x":"y"}"#);
///
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encodes the identification handshake.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_handshake(handshake: &HandshakeMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_message(handshake)
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Leading whitespace is skipped.  Returns the decoded message and the number
/// of bytes consumed up to and including its closing brace, so the caller can
/// advance their read cursor.  Anything after that point is left untouched.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if `bytes` ends before the value
///   does (including when it is empty or only whitespace).
/// - [`ProtocolError::Malformed`] if the bytes are not valid JSON or the
///   value is not an object.
///
/// # Examples
///
/// ```rust
/// use tcpworker_core::protocol::{decode_message, ProtocolError};
///
/// let (msg, n) = decode_message(br#"{"a":1}{"b":2}"#).unwrap();
/// assert_eq!(msg["a"], 1);
/// assert_eq!(n, 7);
///
/// assert!(matches!(
///     decode_message(br#"{"a":"#),
///     Err(ProtocolError::InsufficientData { .. })
/// ));
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<Message>();
    match stream.next() {
        Some(Ok(msg)) => Ok((msg, stream.byte_offset())),
        Some(Err(e)) if e.is_eof() => Err(ProtocolError::InsufficientData {
            available: bytes.len(),
        }),
        Some(Err(e)) => Err(ProtocolError::Malformed(e.to_string())),
        None => Err(ProtocolError::InsufficientData {
            available: bytes.len(),
        }),
    }
}

// ── Streaming buffer ──────────────────────────────────────────────────────────

/// Accumulates bytes from a stream and yields complete messages in order.
///
/// A socket read may return part of a message, or several messages at once.
/// Bytes are appended with [`push`](Self::push) and drained one message at a
/// time with [`next_message`](Self::next_message).  Bytes belonging to a later
/// message stay buffered until it is complete.
///
/// The end of the pending object is found by a bracket scan that resumes
/// where the previous call stopped, so each byte is scanned once and the
/// JSON parser only ever sees a complete object.
///
/// One buffer serves one connection; a reconnect starts with a fresh one.
#[derive(Debug)]
pub struct MessageBuffer {
    buf: Vec<u8>,
    scan: BoundaryScan,
    max_message_bytes: usize,
}

impl MessageBuffer {
    /// Creates an empty buffer that rejects any message larger than
    /// `max_message_bytes`.
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            scan: BoundaryScan::default(),
            max_message_bytes,
        }
    }

    /// Appends bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete message, or `Ok(None)` if more bytes are
    /// needed.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the buffered bytes cannot be a JSON
    ///   object.  The buffer is unusable afterwards.
    /// - [`ProtocolError::MessageTooLarge`] if the pending message exceeds
    ///   the limit, complete or not.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.scan.is_fresh() {
            self.discard_leading_whitespace();
            if self.buf.is_empty() {
                return Ok(None);
            }
            if self.buf[0] != b'{' {
                return Err(ProtocolError::Malformed(format!(
                    "expected a JSON object, found byte 0x{:02x}",
                    self.buf[0]
                )));
            }
        }

        let Some(end) = self.scan.advance(&self.buf) else {
            if self.buf.len() > self.max_message_bytes {
                return Err(ProtocolError::MessageTooLarge {
                    size: self.buf.len(),
                    limit: self.max_message_bytes,
                });
            }
            return Ok(None);
        };

        if end > self.max_message_bytes {
            return Err(ProtocolError::MessageTooLarge {
                size: end,
                limit: self.max_message_bytes,
            });
        }

        let msg = match decode_message(&self.buf[..end]) {
            Ok((msg, _)) => msg,
            // Brackets balanced but the parser still wants more: the
            // brackets were mismatched, e.g. `{"a":[}]`.
            Err(ProtocolError::InsufficientData { .. }) => {
                return Err(ProtocolError::Malformed(
                    "mismatched brackets in object".to_string(),
                ))
            }
            Err(e) => return Err(e),
        };

        self.buf.drain(..end);
        self.scan = BoundaryScan::default();
        trace!(consumed = end, remaining = self.buf.len(), "decoded message");
        Ok(Some(msg))
    }

    /// Returns `true` if part of a message is buffered.
    ///
    /// Used at end-of-stream to tell a clean close from a truncated message.
    pub fn has_partial(&self) -> bool {
        self.buf.iter().any(|b| !is_json_whitespace(*b))
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn discard_leading_whitespace(&mut self) {
        let skip = self
            .buf
            .iter()
            .take_while(|b| is_json_whitespace(**b))
            .count();
        if skip > 0 {
            self.buf.drain(..skip);
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}

fn is_json_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Incremental search for the bracket that closes the top-level value.
///
/// Tracks nesting depth outside string literals.  Validity is left to the
/// JSON parser; this only decides when it is worth running.
#[derive(Debug, Default, Clone, Copy)]
struct BoundaryScan {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BoundaryScan {
    fn is_fresh(&self) -> bool {
        self.pos == 0
    }

    /// Scans `buf[self.pos..]`.  Returns the length of the top-level value
    /// once its closing bracket has been seen.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pos < buf.len() {
            let b = buf[self.pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::Role;
    use serde_json::json;

    fn msg(value: serde_json::Value) -> Message {
        value.as_object().cloned().expect("fixture must be an object")
    }

    // ── encode ────────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_is_compact_without_framing() {
        // Arrange
        let m = msg(json!({"x": "y"}));

        // Act
        let bytes = encode_message(&m).unwrap();

        // Assert – exactly the JSON text, no newline or prefix
        assert_eq!(bytes, br#"{"x":"y"}"#);
    }

    #[test]
    fn test_encode_handshake_bytes() {
        let hs = HandshakeMessage::new("orders", Role::Client);
        let bytes = encode_handshake(&hs).unwrap();
        assert_eq!(bytes, br#"{"ServiceName":"orders","Type":"1"}"#);
    }

    #[test]
    fn test_encode_empty_object() {
        assert_eq!(encode_message(&Message::new()).unwrap(), b"{}");
    }

    #[test]
    fn test_encode_rejects_non_string_map_keys() {
        use std::collections::BTreeMap;
        let mut bad: BTreeMap<Vec<u8>, u8> = BTreeMap::new();
        bad.insert(vec![1, 2], 3);

        let result = encode_message(&bad);

        assert!(matches!(result, Err(ProtocolError::Encode(_))));
    }

    // ── decode ────────────────────────────────────────────────────────────────

    #[test]
    fn test_decode_nested_values() {
        let text = br#"{"s":"t","n":1.5,"b":true,"z":null,"o":{"k":[1,2,{"d":"e"}]}}"#;

        let (decoded, consumed) = decode_message(text).unwrap();

        assert_eq!(consumed, text.len());
        assert_eq!(
            decoded,
            msg(json!({"s":"t","n":1.5,"b":true,"z":null,"o":{"k":[1,2,{"d":"e"}]}}))
        );
    }

    #[test]
    fn test_decode_stops_at_first_object_boundary() {
        let text = br#"{"a":1}{"b":2}"#;

        let (first, consumed) = decode_message(text).unwrap();

        assert_eq!(first, msg(json!({"a": 1})));
        assert_eq!(consumed, 7);
        let (second, _) = decode_message(&text[consumed..]).unwrap();
        assert_eq!(second, msg(json!({"b": 2})));
    }

    #[test]
    fn test_decode_skips_leading_whitespace() {
        let text = b" \r\n\t{\"a\":1}";
        let (decoded, consumed) = decode_message(text).unwrap();
        assert_eq!(decoded, msg(json!({"a": 1})));
        assert_eq!(consumed, text.len());
    }

    #[test]
    fn test_decode_braces_inside_strings_do_not_end_message() {
        let text = br#"{"a":"}{"}"#;
        let (decoded, consumed) = decode_message(text).unwrap();
        assert_eq!(decoded["a"], "}{");
        assert_eq!(consumed, text.len());
    }

    #[test]
    fn test_decode_partial_is_insufficient_data() {
        let result = decode_message(br#"{"a":[1,2"#);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData { available: 9 })
        );
    }

    #[test]
    fn test_decode_empty_is_insufficient_data() {
        assert!(matches!(
            decode_message(b""),
            Err(ProtocolError::InsufficientData { available: 0 })
        ));
        assert!(matches!(
            decode_message(b"   "),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_invalid_json_is_malformed() {
        assert!(matches!(
            decode_message(b"{\"a\" 1}"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_non_object_is_malformed() {
        assert!(matches!(
            decode_message(b"[1,2,3]"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_message(b"\"text\""),
            Err(ProtocolError::Malformed(_))
        ));
    }

    // ── MessageBuffer ─────────────────────────────────────────────────────────

    #[test]
    fn test_buffer_yields_nothing_until_message_complete() {
        // Arrange
        let mut buffer = MessageBuffer::default();

        // Act – first half of the object
        buffer.push(br#"{"greet":"#);
        let first = buffer.next_message().unwrap();

        // Second half
        buffer.push(br#""hi"}"#);
        let second = buffer.next_message().unwrap();

        // Assert
        assert!(first.is_none());
        assert_eq!(second, Some(msg(json!({"greet": "hi"}))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_drains_coalesced_messages_in_order() {
        let mut buffer = MessageBuffer::default();
        buffer.push(br#"{"n":1}{"n":2}  {"n":3}"#);

        let mut seen = Vec::new();
        while let Some(m) = buffer.next_message().unwrap() {
            seen.push(m["n"].as_i64().unwrap());
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(!buffer.has_partial());
    }

    #[test]
    fn test_buffer_keeps_trailing_partial_message() {
        let mut buffer = MessageBuffer::default();
        buffer.push(br#"{"n":1}{"n""#);

        assert_eq!(buffer.next_message().unwrap(), Some(msg(json!({"n": 1}))));
        assert_eq!(buffer.next_message().unwrap(), None);
        assert!(buffer.has_partial());
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_buffer_whitespace_only_is_not_partial() {
        let mut buffer = MessageBuffer::default();
        buffer.push(b"\n\n  ");

        assert_eq!(buffer.next_message().unwrap(), None);
        assert!(!buffer.has_partial());
        assert!(buffer.is_empty(), "leading whitespace is discarded");
    }

    #[test]
    fn test_buffer_malformed_is_error() {
        let mut buffer = MessageBuffer::default();
        buffer.push(b"not json");

        assert!(matches!(
            buffer.next_message(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_buffer_rejects_oversized_incomplete_message() {
        // Arrange – limit of 8 bytes, 10 bytes of an unfinished object
        let mut buffer = MessageBuffer::new(8);
        buffer.push(br#"{"a":"bbbb"#);

        // Act
        let result = buffer.next_message();

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::MessageTooLarge { size: 10, limit: 8 })
        );
    }

    #[test]
    fn test_buffer_rejects_oversized_complete_message() {
        let mut buffer = MessageBuffer::new(8);
        buffer.push(br#"{"a":"bbbbbb"}"#);

        assert!(matches!(
            buffer.next_message(),
            Err(ProtocolError::MessageTooLarge { size: 14, limit: 8 })
        ));
    }

    #[test]
    fn test_buffer_non_object_value_is_malformed() {
        let mut buffer = MessageBuffer::default();
        buffer.push(b"[1,2]");

        assert!(matches!(
            buffer.next_message(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_buffer_mismatched_brackets_are_malformed() {
        let mut buffer = MessageBuffer::default();
        buffer.push(br#"{"a":[}]"#);

        assert!(matches!(
            buffer.next_message(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_buffer_brackets_and_escapes_inside_strings_split_across_pushes() {
        // Arrange – every byte pushed separately, so the scan resumes inside
        // strings and right after a backslash
        let text = br#"{"a":"}]\"{[","b":{"c":["\\"]}}{"n":2}"#;
        let mut buffer = MessageBuffer::default();
        let mut seen = Vec::new();

        // Act
        for byte in text.iter() {
            buffer.push(std::slice::from_ref(byte));
            while let Some(m) = buffer.next_message().unwrap() {
                seen.push(m);
            }
        }

        // Assert
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["a"], "}]\"{[");
        assert_eq!(seen[0]["b"], json!({"c": ["\\"]}));
        assert_eq!(seen[1], msg(json!({"n": 2})));
    }

    #[test]
    fn test_buffer_decodes_multi_mib_message_in_linear_time() {
        // Arrange – 4 MiB object fed in 8 KiB reads
        let big = msg(json!({"blob": "x".repeat(4 * 1024 * 1024), "tail": [1, 2, 3]}));
        let bytes = encode_message(&big).unwrap();
        let mut buffer = MessageBuffer::default();
        let started = std::time::Instant::now();

        // Act
        let mut decoded = None;
        for chunk in bytes.chunks(8 * 1024) {
            buffer.push(chunk);
            if let Some(m) = buffer.next_message().unwrap() {
                decoded = Some(m);
            }
        }

        // Assert
        assert_eq!(decoded, Some(big));
        assert!(buffer.is_empty());
        assert!(
            started.elapsed() < std::time::Duration::from_secs(2),
            "decode took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_buffer_accepts_message_at_exact_limit() {
        let mut buffer = MessageBuffer::new(7);
        buffer.push(br#"{"a":1}"#);

        assert_eq!(buffer.next_message().unwrap(), Some(msg(json!({"a": 1}))));
    }
}
