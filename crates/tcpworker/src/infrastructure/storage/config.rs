//! TOML configuration file for the `tcpworker` binary.
//!
//! Every field is optional.  Anything the file leaves out falls back to the
//! built-in default, and anything given on the command line wins over the
//! file.
//!
//! ```toml
//! [worker]
//! name = "billing"
//! server_addr = "10.0.0.5:7000"
//! role = "worker"            # "client", "worker", "1" or "2"
//! reconnect_delay_secs = 10
//! max_message_bytes = 16777216
//! inbound_buffer = 128
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tcpworker_core::protocol::DEFAULT_MAX_MESSAGE_BYTES;
use tcpworker_core::{ProtocolError, Role};
use thiserror::Error;

use crate::domain::config::{DEFAULT_INBOUND_BUFFER, DEFAULT_RECONNECT_DELAY};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The `role` field is not a known role.
    #[error("invalid role in config: {0}")]
    Role(#[source] ProtocolError),

    /// A numeric field is out of range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level contents of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub worker: WorkerSection,
}

/// The `[worker]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    /// Logical name sent in the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Server address, `host:port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_addr: Option<String>,
    /// Role name or wire token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Seconds to wait between reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Largest inbound message accepted, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Capacity of the inbound message channel.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_reconnect_delay_secs() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_secs()
}
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}
fn default_inbound_buffer() -> usize {
    DEFAULT_INBOUND_BUFFER
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            name: None,
            server_addr: None,
            role: None,
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_message_bytes: default_max_message_bytes(),
            inbound_buffer: default_inbound_buffer(),
            log_level: default_log_level(),
        }
    }
}

impl WorkerSection {
    /// Parses the `role` field, if present.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Role`] when the value is not a known role.
    pub fn role(&self) -> Result<Option<Role>, ConfigError> {
        self.role
            .as_deref()
            .map(|r| r.parse::<Role>().map_err(ConfigError::Role))
            .transpose()
    }

    /// The reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Checks the fields that a [`Worker`](crate::infrastructure::network::Worker)
    /// cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Role`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.role()?;
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_message_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.inbound_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "inbound_buffer",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses and validates config text.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML, otherwise see
/// [`WorkerSection::validate`].
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    let cfg: FileConfig = toml::from_str(content)?;
    cfg.worker.validate()?;
    Ok(cfg)
}

/// Loads the config file at `path`.
///
/// The path was asked for explicitly, so a missing file is an error rather
/// than an empty config.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise see
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
