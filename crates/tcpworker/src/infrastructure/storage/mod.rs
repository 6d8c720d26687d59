//! Storage infrastructure: the optional TOML configuration file.
//!
//! The binary reads it once at startup; command-line flags then override
//! whatever it sets.

pub mod config;
