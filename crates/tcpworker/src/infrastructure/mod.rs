//! Infrastructure layer: sockets and files.
//!
//! # Sub-modules
//!
//! - **`network`** – the [`Worker`](network::Worker): dials the server,
//!   sends the identification handshake, decodes the inbound stream, and
//!   reconnects with a fixed delay whenever the connection is lost.
//!
//! - **`storage`** – reads the optional TOML config file.

pub mod network;
pub mod storage;
