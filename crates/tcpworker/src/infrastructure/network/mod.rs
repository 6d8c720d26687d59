//! Network infrastructure: the self-healing connection to the server.
//!
//! Architecture:
//! - [`Worker`] is the caller's handle.  Constructing it dials the server and
//!   sends the handshake; failure there is returned to the caller.
//! - A single background task (the supervisor) owns the read half of the
//!   current connection, decodes one message at a time, and forwards each on
//!   the inbound `mpsc` channel.  When the stream fails it closes the
//!   connection and re-dials every `reconnect_delay` until it succeeds.
//! - [`Worker::send`] writes to whatever connection is current.  The slot
//!   holding it is behind one `Mutex` that is never held across I/O; the
//!   supervisor takes the connection out to close it and puts the
//!   replacement in once its handshake is out.
//! - Each connection carries an abort flag.  The supervisor raises it before
//!   closing, and a send still waiting on the socket gives up with
//!   [`io::ErrorKind::ConnectionAborted`], so a peer that stops reading can
//!   never hold up a reconnect or a shutdown.

pub mod dialer;
pub mod reader;

use std::io;
use std::sync::Arc;

use tcpworker_core::protocol::{encode_handshake, encode_message, HandshakeMessage};
use tcpworker_core::{Message, ProtocolError, Role};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::domain::{ConnectionState, WorkerConfig};

pub use dialer::{BoxedStream, ConnectionStream, Dialer, TcpDialer};
pub use reader::{MessageReader, StreamError};

/// Failed reconnect attempts are logged at `warn` on the first attempt and
/// then once every this many attempts; the rest go to `debug`.
const RECONNECT_WARN_EVERY: u64 = 6;

type Reader = MessageReader<ReadHalf<BoxedStream>>;
type Writer = WriteHalf<BoxedStream>;
type Slot = Arc<Mutex<Option<Arc<Connection>>>>;

/// Write side of one live connection.
struct Connection {
    /// Serializes concurrent sends so their bytes never interleave.
    writer: Mutex<Writer>,
    /// Raised by the supervisor once this connection is being closed.
    aborted: watch::Receiver<bool>,
}

impl Connection {
    /// Wraps `writer` and returns the sender that aborts it.
    fn open(writer: Writer) -> (Arc<Self>, watch::Sender<bool>) {
        let (abort, aborted) = watch::channel(false);
        let conn = Arc::new(Self {
            writer: Mutex::new(writer),
            aborted,
        });
        (conn, abort)
    }

    fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }
}

/// Errors surfaced to callers of [`Worker`].
#[derive(Debug, Error)]
pub enum WorkerError {
    /// TCP connect to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The handshake could not be serialized.
    #[error("failed to encode handshake: {0}")]
    HandshakeEncode(#[source] ProtocolError),
    /// Writing the handshake to the fresh connection failed.
    #[error("failed to send handshake: {0}")]
    HandshakeWrite(#[source] io::Error),
    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    SendEncode(#[source] ProtocolError),
    /// Writing an outbound message failed, or no connection is current.
    #[error("failed to send message: {0}")]
    SendWrite(#[source] io::Error),
}

impl WorkerError {
    /// Returns `true` if a send failed because the worker is between
    /// connections.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, WorkerError::SendWrite(e) if e.kind() == io::ErrorKind::NotConnected)
    }
}

/// Writes the identification handshake to a freshly dialed connection.
///
/// Fire and forget: nothing is read back from the server.
///
/// # Errors
///
/// [`WorkerError::HandshakeEncode`] or [`WorkerError::HandshakeWrite`].
pub async fn handshake<W>(writer: &mut W, name: &str, role: Role) -> Result<(), WorkerError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_handshake(&HandshakeMessage::new(name, role))
        .map_err(WorkerError::HandshakeEncode)?;
    write_frame(writer, &bytes)
        .await
        .map_err(WorkerError::HandshakeWrite)
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Dials the server and sends the handshake.  One successful call means one
/// handshake on the wire.
async fn establish(
    dialer: &dyn Dialer,
    config: &WorkerConfig,
) -> Result<(Reader, Writer), WorkerError> {
    let stream = dialer
        .dial(&config.server_addr)
        .await
        .map_err(|source| WorkerError::Dial {
            addr: config.server_addr.clone(),
            source,
        })?;

    let (read_half, mut write_half) = tokio::io::split(stream);
    handshake(&mut write_half, &config.name, config.role).await?;

    Ok((
        MessageReader::new(read_half, config.max_message_bytes),
        write_half,
    ))
}

/// Resolves once `flag` is raised or its sender is gone.
///
/// Used for both the worker-wide shutdown flag and a connection's abort flag.
async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|up| *up).await;
}

fn not_connected() -> WorkerError {
    WorkerError::SendWrite(io::Error::new(
        io::ErrorKind::NotConnected,
        "no active connection to server",
    ))
}

fn aborted_mid_send() -> WorkerError {
    WorkerError::SendWrite(io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "connection closed while sending",
    ))
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Handle to a persistent, self-healing connection to one server.
///
/// Inbound messages arrive on the `mpsc::Sender` passed at construction, in
/// wire order.  Outbound messages go through [`send`](Self::send).
///
/// Dropping the handle stops the background task; [`shutdown`](Self::shutdown)
/// does the same and waits for it to finish.
pub struct Worker {
    config: Arc<WorkerConfig>,
    current: Slot,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Worker {
    /// Connects over TCP, sends the handshake, and starts the background
    /// decode task.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Dial`], [`WorkerError::HandshakeEncode`] or
    /// [`WorkerError::HandshakeWrite`].  On error no task is started and
    /// `inbound` is dropped unused.
    pub async fn connect(
        config: WorkerConfig,
        inbound: mpsc::Sender<Message>,
    ) -> Result<Self, WorkerError> {
        Self::connect_with(config, Arc::new(TcpDialer), inbound).await
    }

    /// Like [`connect`](Self::connect) but dials through `dialer`, which is
    /// also used for every reconnect.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with(
        config: WorkerConfig,
        dialer: Arc<dyn Dialer>,
        inbound: mpsc::Sender<Message>,
    ) -> Result<Self, WorkerError> {
        let (reader, writer) = establish(dialer.as_ref(), &config).await?;
        info!(
            "connected to {} as {:?} ({})",
            config.server_addr, config.name, config.role
        );

        let config = Arc::new(config);
        let (conn, abort) = Connection::open(writer);
        let current = Arc::new(Mutex::new(Some(conn)));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            config: Arc::clone(&config),
            dialer,
            current: Arc::clone(&current),
            abort,
            inbound,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run(reader));

        Ok(Self {
            config,
            current,
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        })
    }

    /// Encodes `message` and writes it to the current connection.
    ///
    /// Not retried and not queued.  Concurrent calls are serialized, so
    /// their bytes never interleave on the wire.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::SendEncode`] if the message cannot be serialized.
    /// - [`WorkerError::SendWrite`] if the write fails, with
    ///   [`io::ErrorKind::NotConnected`] while the worker is reconnecting
    ///   or closed, or with [`io::ErrorKind::ConnectionAborted`] if the
    ///   connection is closed while this send is still waiting on it.
    pub async fn send(&self, message: &Message) -> Result<(), WorkerError> {
        let bytes = encode_message(message).map_err(WorkerError::SendEncode)?;

        let conn = self.current.lock().await.clone();
        let conn = match conn {
            Some(conn) if !conn.is_aborted() => conn,
            _ => return Err(not_connected()),
        };
        let mut aborted = conn.aborted.clone();

        let mut writer = tokio::select! {
            biased;
            _ = raised(&mut aborted) => return Err(aborted_mid_send()),
            writer = conn.writer.lock() => writer,
        };
        tokio::select! {
            biased;
            _ = raised(&mut aborted) => return Err(aborted_mid_send()),
            written = write_frame(&mut *writer, &bytes) => {
                written.map_err(WorkerError::SendWrite)?;
            }
        }

        debug!(bytes = bytes.len(), "sent message");
        Ok(())
    }

    /// Subscribes to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Returns the state at this instant.
    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Logical name sent in every handshake.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Address dialed on connect and on every reconnect.
    pub fn server_addr(&self) -> &str {
        &self.config.server_addr
    }

    /// Role sent in every handshake.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Asks the background task to stop without waiting for it.
    ///
    /// Sends still waiting on the socket fail once the task closes the
    /// connection.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stops the background task and waits for it to exit.
    ///
    /// Interrupts a blocked read, a pending dial, a reconnect delay, a send
    /// into a full inbound channel, or an outbound write stuck on a peer
    /// that stopped reading.  The connection, if any, is closed and the
    /// state becomes [`ConnectionState::Closed`].
    pub async fn shutdown(mut self) {
        self.request_shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("worker task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.request_shutdown();
    }
}

// ── Supervisor (background task) ──────────────────────────────────────────────

/// Why the decode loop stopped reading the current connection.
enum Exit {
    Shutdown,
    ConsumerGone,
    StreamFailed(StreamError),
}

/// State owned by the background task.
struct Supervisor {
    config: Arc<WorkerConfig>,
    dialer: Arc<dyn Dialer>,
    current: Slot,
    /// Aborts the connection currently in `current`.
    abort: watch::Sender<bool>,
    inbound: mpsc::Sender<Message>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    /// Alternates between decoding the current connection and re-dialing
    /// until shutdown or until the consumer drops the inbound receiver.
    async fn run(mut self, mut reader: Reader) {
        loop {
            let exit = self.pump(&mut reader).await;

            // The old connection is fully closed before anything else happens.
            drop(reader);
            self.close_current().await;

            match exit {
                Exit::Shutdown => {
                    info!("worker {:?} shutting down", self.config.name);
                    break;
                }
                Exit::ConsumerGone => {
                    info!("inbound receiver dropped; worker {:?} stopping", self.config.name);
                    break;
                }
                Exit::StreamFailed(e) => {
                    warn!("connection to {} lost: {e}", self.config.server_addr);
                    self.state.send_replace(ConnectionState::Reconnecting);
                    match self.reconnect().await {
                        Some(next) => {
                            reader = next;
                            self.state.send_replace(ConnectionState::Connected);
                        }
                        None => {
                            info!("worker {:?} shutting down", self.config.name);
                            break;
                        }
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Closed);
    }

    /// CONNECTED: decode one message, forward it, repeat.
    ///
    /// Forwarding waits for channel capacity, so a slow consumer stalls
    /// socket reads.
    async fn pump(&mut self, reader: &mut Reader) -> Exit {
        loop {
            let msg = tokio::select! {
                biased;
                _ = raised(&mut self.shutdown) => return Exit::Shutdown,
                result = reader.next_message() => match result {
                    Ok(msg) => msg,
                    Err(e) => return Exit::StreamFailed(e),
                },
            };
            debug!(keys = msg.len(), "received message");

            tokio::select! {
                biased;
                _ = raised(&mut self.shutdown) => return Exit::Shutdown,
                sent = self.inbound.send(msg) => {
                    if sent.is_err() {
                        return Exit::ConsumerGone;
                    }
                }
            }
        }
    }

    /// RECONNECTING: dial + handshake until one succeeds, sleeping the fixed
    /// delay after each failure.  The first attempt is immediate.
    ///
    /// Returns `None` if shutdown is requested first.
    async fn reconnect(&mut self) -> Option<Reader> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = raised(&mut self.shutdown) => return None,
                result = establish(self.dialer.as_ref(), &self.config) => result,
            };

            match result {
                Ok((reader, writer)) => {
                    let (conn, abort) = Connection::open(writer);
                    tokio::select! {
                        biased;
                        _ = raised(&mut self.shutdown) => return None,
                        mut slot = self.current.lock() => *slot = Some(conn),
                    }
                    self.abort = abort;
                    info!(
                        attempt,
                        "reconnected to {} as {:?}", self.config.server_addr, self.config.name
                    );
                    return Some(reader);
                }
                Err(e) if attempt == 1 || attempt % RECONNECT_WARN_EVERY == 0 => {
                    warn!(
                        attempt,
                        "reconnect failed: {e}; retrying in {:?}", self.config.reconnect_delay
                    );
                }
                Err(e) => {
                    debug!(attempt, "reconnect failed: {e}");
                }
            }

            tokio::select! {
                biased;
                _ = raised(&mut self.shutdown) => return None,
                _ = time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Aborts in-flight sends, takes the connection out of the slot and
    /// shuts down its write half.
    ///
    /// If a send still holds the writer, the socket closes as soon as that
    /// send lets go of it.
    async fn close_current(&mut self) {
        self.abort.send_replace(true);

        let conn = tokio::select! {
            biased;
            mut slot = self.current.lock() => slot.take(),
            _ = raised(&mut self.shutdown) => None,
        };
        let Some(conn) = conn else { return };

        if let Ok(mut writer) = conn.writer.try_lock() {
            if let Err(e) = writer.shutdown().await {
                debug!("error closing connection: {e}");
            }
        };
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
