//! Console bridge: stdin lines out to the server, inbound messages to stdout.
//!
//! Stdin is read on a plain OS thread that hands lines to the runtime over a
//! channel.  The thread is never joined, so a read parked on an idle
//! terminal does not keep the process alive after shutdown.
//!
//! The outbound side goes through [`MessageSink`], so the binary plugs in a
//! [`Worker`] while tests plug in a recording sink.

use std::io::{self, BufRead};

use async_trait::async_trait;
use tcpworker_core::Message;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::infrastructure::network::Worker;

/// Anything that can send one message to the server.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends `message`, returning a description of the failure if it was not
    /// written.
    async fn send(&self, message: &Message) -> Result<(), String>;
}

#[async_trait]
impl MessageSink for Worker {
    async fn send(&self, message: &Message) -> Result<(), String> {
        Worker::send(self, message).await.map_err(|e| e.to_string())
    }
}

/// Line counts reported by [`pump_outbound`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundStats {
    /// Lines sent successfully.
    pub sent: u64,
    /// Lines that were not JSON objects.
    pub invalid: u64,
    /// Lines whose send failed.
    pub failed: u64,
}

/// Starts the stdin reader thread and returns the channel its lines arrive
/// on.  The channel closes at end of input or on a read error.
///
/// # Errors
///
/// If the thread cannot be spawned.
pub fn spawn_stdin_reader(capacity: usize) -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(capacity);

    std::thread::Builder::new()
        .name("tcpworker-stdin".to_string())
        .spawn(move || match forward_lines(io::stdin().lock(), &tx) {
            Ok(count) => debug!(lines = count, "stdin reader finished"),
            Err(e) => error!("failed to read stdin: {e}"),
        })?;

    Ok(rx)
}

/// Blocking loop: sends every line of `input` on `tx` until EOF or until the
/// receiver is dropped.  Returns the number of lines forwarded.
///
/// Must not be called from async context.
///
/// # Errors
///
/// If reading `input` fails.
pub fn forward_lines<R: BufRead>(input: R, tx: &mpsc::Sender<String>) -> io::Result<u64> {
    let mut forwarded = 0u64;
    for line in input.lines() {
        if tx.blocking_send(line?).is_err() {
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

/// Drains `lines` until the channel closes, sending each non-blank line as
/// one message.
///
/// A line that is not a JSON object, or whose send fails, is logged and
/// skipped; the pump keeps going.
pub async fn pump_outbound<S>(lines: &mut mpsc::Receiver<String>, sink: &S) -> OutboundStats
where
    S: MessageSink + ?Sized,
{
    let mut stats = OutboundStats::default();

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                warn!("skipping input line, not a JSON object: {e}");
                stats.invalid += 1;
                continue;
            }
        };

        match sink.send(&message).await {
            Ok(()) => stats.sent += 1,
            Err(e) => {
                warn!("{e}");
                stats.failed += 1;
            }
        }
    }

    debug!(?stats, "outbound input exhausted");
    stats
}

/// Writes every message received on `inbound` to `out` as one line of
/// compact JSON, until the channel closes.
///
/// Returns the number of messages written.
///
/// # Errors
///
/// If writing to `out` fails.
pub async fn pump_inbound<W>(inbound: &mut mpsc::Receiver<Message>, mut out: W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    let mut line = Vec::new();

    while let Some(message) = inbound.recv().await {
        line.clear();
        serde_json::to_writer(&mut line, &message)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
        written += 1;
    }

    Ok(written)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
