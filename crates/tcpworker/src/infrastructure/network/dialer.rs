//! Dialing the server.
//!
//! The worker never calls `TcpStream::connect` directly; it goes through the
//! [`Dialer`] trait so tests can hand it in-memory streams and script dial
//! failures.  [`TcpDialer`] is the production implementation.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A bidirectional byte stream the worker can own and split.
pub trait ConnectionStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ConnectionStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A type-erased connection as returned by a [`Dialer`].
pub type BoxedStream = Box<dyn ConnectionStream>;

/// Opens a new connection to the server.
///
/// Called once at construction and once per reconnect attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connects to `addr` (`host:port`).
    async fn dial(&self, addr: &str) -> io::Result<BoxedStream>;
}

/// Plain TCP dialer.
///
/// No connect timeout is applied: a dial blocks until the platform gives up
/// or the peer refuses.  Nagle's algorithm is disabled so small messages are
/// not held back.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(
            "tcp connected {} -> {}",
            stream.local_addr()?,
            stream.peer_addr()?
        );
        Ok(Box::new(stream))
    }
}
