//! tcpworker library entry point.
//!
//! A persistent TCP client for a JSON streaming server.  A [`Worker`]
//! connects, identifies itself with a one-shot handshake, and then:
//!
//! 1. Delivers every JSON object the server sends, in order, on a
//!    `tokio::sync::mpsc` channel.
//! 2. Writes messages to the server on request via [`Worker::send`].
//! 3. When the connection drops, closes it and re-dials every
//!    `reconnect_delay` (10 s by default) until it is back, sending a fresh
//!    handshake each time.
//!
//! ```no_run
//! use tcpworker::domain::WorkerConfig;
//! use tcpworker::Worker;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), tcpworker::WorkerError> {
//! let (tx, mut rx) = mpsc::channel(128);
//! let worker = Worker::connect(WorkerConfig::new("billing", "10.0.0.5:7000"), tx).await?;
//!
//! while let Some(msg) = rx.recv().await {
//!     worker.send(&msg).await?;
//! }
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration and connection state.
pub mod domain;

/// Application layer: the console bridge used by the binary.
pub mod application;

/// Infrastructure layer: network connection and config file.
pub mod infrastructure;

pub use infrastructure::network::{Worker, WorkerError};
pub use tcpworker_core::{Message, Role};
