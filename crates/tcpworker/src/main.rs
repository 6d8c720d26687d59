//! tcpworker: console front end for a self-healing TCP worker connection.
//!
//! Connects to the server, sends the identification handshake, and then
//! bridges the connection to the terminal:
//!
//! - every non-blank line on stdin is parsed as one JSON object and sent;
//! - every object received from the server is printed on stdout as one line
//!   of compact JSON.
//!
//! Logs go to stderr, so stdout can be piped into another program.  The
//! connection is re-established automatically whenever it drops.  Ctrl+C or
//! end of stdin stops the worker.
//!
//! # Usage
//!
//! ```text
//! tcpworker [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --name <NAME>                Logical name sent in the handshake
//!   --server <HOST:PORT>         Server address
//!   --role <ROLE>                client | worker | 1 | 2  [default: worker]
//!   --reconnect-delay <SECS>     Delay between reconnect attempts [default: 10]
//!   --max-message-bytes <BYTES>  Largest accepted inbound message [default: 16 MiB]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                      | Flag                  |
//! |-------------------------------|-----------------------|
//! | `TCPWORKER_CONFIG`            | `--config`            |
//! | `TCPWORKER_NAME`              | `--name`              |
//! | `TCPWORKER_SERVER`            | `--server`            |
//! | `TCPWORKER_ROLE`              | `--role`              |
//! | `TCPWORKER_RECONNECT_DELAY`   | `--reconnect-delay`   |
//! | `TCPWORKER_MAX_MESSAGE_BYTES` | `--max-message-bytes` |
//!
//! Flags and variables override the config file, which overrides the
//! built-in defaults.  `RUST_LOG` overrides the file's `log_level`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tcpworker::application::console::{pump_inbound, pump_outbound, spawn_stdin_reader};
use tcpworker::domain::WorkerConfig;
use tcpworker::infrastructure::storage::config::{load_config, FileConfig};
use tcpworker::{Role, Worker};

/// Stdin lines buffered ahead of the outbound pump.
const STDIN_LINE_BUFFER: usize = 64;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Self-healing TCP worker speaking back-to-back JSON objects.
#[derive(Debug, Parser)]
#[command(
    name = "tcpworker",
    about = "Persistent TCP client bridging a JSON streaming server to stdin/stdout",
    version
)]
struct Cli {
    /// TOML config file with a `[worker]` section.
    #[arg(long, env = "TCPWORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Logical name presented to the server in every handshake.
    #[arg(long, env = "TCPWORKER_NAME")]
    name: Option<String>,

    /// Server address in `host:port` form.
    #[arg(long, env = "TCPWORKER_SERVER")]
    server: Option<String>,

    /// Role declared in the handshake.
    #[arg(long, env = "TCPWORKER_ROLE")]
    role: Option<Role>,

    /// Seconds to wait between reconnect attempts.
    #[arg(long, env = "TCPWORKER_RECONNECT_DELAY")]
    reconnect_delay: Option<u64>,

    /// Largest inbound message accepted, in bytes.
    #[arg(long, env = "TCPWORKER_MAX_MESSAGE_BYTES")]
    max_message_bytes: Option<usize>,
}

/// Everything `main` needs after merging the CLI with the config file.
#[derive(Debug)]
struct Settings {
    worker: WorkerConfig,
    log_level: String,
}

impl Cli {
    /// Merges the flags over the config file (if any) over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, if no name or
    /// server address is given anywhere, or if a size limit is zero.
    fn into_settings(self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => FileConfig::default(),
        };
        let section = file.worker;

        let Some(name) = self.name.or(section.name.clone()) else {
            bail!("no worker name given (use --name or `name` in the config file)");
        };
        let Some(server_addr) = self.server.or(section.server_addr.clone()) else {
            bail!("no server address given (use --server or `server_addr` in the config file)");
        };

        let role = match self.role {
            Some(role) => role,
            None => section.role()?.unwrap_or_default(),
        };
        let reconnect_delay = self
            .reconnect_delay
            .map(Duration::from_secs)
            .unwrap_or_else(|| section.reconnect_delay());
        let max_message_bytes = self.max_message_bytes.unwrap_or(section.max_message_bytes);
        if max_message_bytes == 0 {
            bail!("--max-message-bytes must be at least 1");
        }

        let mut worker = WorkerConfig::new(name, server_addr)
            .with_role(role)
            .with_reconnect_delay(reconnect_delay)
            .with_max_message_bytes(max_message_bytes);
        worker.inbound_buffer = section.inbound_buffer;

        Ok(Settings {
            worker,
            log_level: section.log_level,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Cli::parse().into_settings()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    let config = settings.worker;
    info!(
        "tcpworker starting: name={:?} server={} role={}",
        config.name, config.server_addr, config.role
    );

    let (tx, mut rx) = mpsc::channel(config.inbound_buffer);
    let worker = Worker::connect(config, tx)
        .await
        .context("initial connection failed")?;

    // The inbound pump finishes on its own once the worker task exits and
    // drops its end of the channel.
    let inbound = tokio::spawn(async move { pump_inbound(&mut rx, tokio::io::stdout()).await });
    let mut lines = spawn_stdin_reader(STDIN_LINE_BUFFER).context("failed to start stdin reader")?;

    tokio::select! {
        stats = pump_outbound(&mut lines, &worker) => info!(
            sent = stats.sent,
            invalid = stats.invalid,
            failed = stats.failed,
            "stdin closed; shutting down"
        ),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        },
    }

    worker.shutdown().await;

    match inbound.await {
        Ok(Ok(written)) => info!(received = written, "tcpworker stopped"),
        Ok(Err(e)) => warn!("stdout closed early: {e}"),
        Err(e) => error!("inbound pump ended abnormally: {e}"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
