//! Reading whole messages off a byte stream.
//!
//! TCP delivers bytes, not messages: one `read()` may return half an object
//! or several objects at once.  [`MessageReader`] keeps a
//! [`MessageBuffer`] alive for the lifetime of one connection, so bytes that
//! belong to the next message are never thrown away between calls.

use std::io;

use tcpworker_core::{Message, MessageBuffer, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each individual socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Why a stream stopped producing messages.
///
/// Every variant means the connection is finished; none is retried in place.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer closed the connection between messages.
    #[error("connection closed by server")]
    Closed,

    /// The peer closed the connection in the middle of a message.
    #[error("connection closed mid-message ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// The socket read failed.
    #[error("read error: {0}")]
    Io(#[from] io::Error),

    /// The bytes on the wire are not a valid message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Yields one decoded [`Message`] at a time from an [`AsyncRead`].
pub struct MessageReader<R> {
    reader: R,
    buffer: MessageBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wraps `reader`, rejecting any message larger than `max_message_bytes`.
    pub fn new(reader: R, max_message_bytes: usize) -> Self {
        Self {
            reader,
            buffer: MessageBuffer::new(max_message_bytes),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Returns the next message, reading from the stream only when the
    /// buffer does not already hold a complete one.
    ///
    /// Cancel safe: if the future is dropped while waiting on the socket, no
    /// bytes are lost and a later call resumes where this one stopped.
    ///
    /// # Errors
    ///
    /// See [`StreamError`].  After an error the reader must be discarded.
    pub async fn next_message(&mut self) -> Result<Message, StreamError> {
        loop {
            if let Some(msg) = self.buffer.next_message()? {
                return Ok(msg);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(if self.buffer.has_partial() {
                    StreamError::Truncated {
                        buffered: self.buffer.len(),
                    }
                } else {
                    StreamError::Closed
                });
            }
            self.buffer.push(&self.chunk[..n]);
        }
    }

    /// Consumes the reader and returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::io::Builder;

    fn obj(value: serde_json::Value) -> Message {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_reads_messages_split_across_reads() {
        // Arrange – object boundaries fall in the middle of reads
        let mock = Builder::new()
            .read(br#"{"a":"#)
            .read(br#"1}{"b""#)
            .read(b":2}\n")
            .build();
        let mut reader = MessageReader::new(mock, 1024);

        // Act / Assert
        assert_eq!(reader.next_message().await.unwrap(), obj(json!({"a": 1})));
        assert_eq!(reader.next_message().await.unwrap(), obj(json!({"b": 2})));
        assert!(matches!(
            reader.next_message().await,
            Err(StreamError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_coalesced_messages_are_returned_one_at_a_time() {
        let mock = Builder::new().read(br#"{"n":1}{"n":2}{"n":3}"#).build();
        let mut reader = MessageReader::new(mock, 1024);

        for expected in 1..=3 {
            let msg = reader.next_message().await.unwrap();
            assert_eq!(msg["n"], expected);
        }
    }

    #[tokio::test]
    async fn test_eof_mid_message_is_truncated() {
        let mock = Builder::new().read(br#"{"a":1"#).build();
        let mut reader = MessageReader::new(mock, 1024);

        let result = reader.next_message().await;

        assert!(matches!(
            result,
            Err(StreamError::Truncated { buffered: 6 })
        ));
    }

    #[tokio::test]
    async fn test_read_error_is_io() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = MessageReader::new(mock, 1024);

        match reader.next_message().await {
            Err(StreamError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_protocol_error() {
        let mock = Builder::new().read(b"{oops}").build();
        let mut reader = MessageReader::new(mock, 1024);

        assert!(matches!(
            reader.next_message().await,
            Err(StreamError::Protocol(ProtocolError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_message_over_limit_is_protocol_error() {
        let mock = Builder::new().read(br#"{"big":"0123456789"}"#).build();
        let mut reader = MessageReader::new(mock, 8);

        assert!(matches!(
            reader.next_message().await,
            Err(StreamError::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));
    }
}
