//! Domain layer for tcpworker.
//!
//! Plain types with no I/O: the worker configuration and the connection
//! lifecycle states reported to the consumer.

pub mod config;
pub mod state;

pub use config::WorkerConfig;
pub use state::ConnectionState;
