//! Application layer use cases.
//!
//! - **`console`** – bridges a line-oriented text stream (stdin/stdout in the
//!   binary) to a worker: each input line becomes one outbound message, each
//!   inbound message becomes one output line.

pub mod console;
