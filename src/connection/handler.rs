//! Client Session
//!
//! Each client connection runs its own session loop in its own Tokio task:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  decoder.next_command()      │◄──────┐
//! └──────────────┬───────────────┘       │
//!                ▼                       │
//! ┌──────────────────────────────┐       │
//! │  command_handler.execute()   │       │
//! └──────────────┬───────────────┘       │
//!                ▼                       │
//! ┌──────────────────────────────┐       │
//! │  write + flush reply         │───────┘ keep_open
//! └──────────────────────────────┘
//! ```
//!
//! The loop ends when the client sends QUIT, closes the stream, the stream
//! fails, or the input is malformed. A malformed request gets one
//! `-ERR <reason>` reply and then the session ends: after a bad frame the
//! position of the next command in the stream is unknown.
//!
//! Every failure is returned as a [`ConnectionError`] and ends only this
//! session; other sessions and the shared store are unaffected.

use crate::commands::CommandHandler;
use crate::protocol::{DecodeError, Decoder, ParseError, Reply};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request; the client was sent an error reply first
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ParseError),

    /// Client closed the stream between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client closed the stream in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

impl From<DecodeError> for ConnectionError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::EndOfStream => ConnectionError::ClientDisconnected,
            DecodeError::UnexpectedEof => ConnectionError::UnexpectedEof,
            DecodeError::Io(e) => ConnectionError::IoError(e),
            DecodeError::Protocol(e) => ConnectionError::ProtocolError(e),
        }
    }
}

/// Handles a single client session.
pub struct ConnectionHandler<R, W> {
    decoder: Decoder<R>,

    writer: BufWriter<W>,

    /// Client's address (for logging)
    addr: SocketAddr,

    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Reused serialization buffer
    out: Vec<u8>,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            decoder: Decoder::new(reader),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
            stats,
            out: Vec::with_capacity(256),
        }
    }

    /// Runs the session until the client quits or an error occurs.
    ///
    /// A client that closes the stream between commands is reported as
    /// [`ConnectionError::ClientDisconnected`].
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let command = match self.decoder.next_command().await {
                Ok(command) => command,
                Err(DecodeError::Protocol(e)) => {
                    warn!(client = %self.addr, error = %e, "Parse error");
                    self.send_reply(&Reply::error(format!("ERR {}", e))).await?;
                    return Err(ConnectionError::ProtocolError(e));
                }
                Err(e) => return Err(e.into()),
            };

            let outcome = self.command_handler.execute(&command);
            self.stats.command_processed();
            if outcome.reply.is_error() {
                debug!(client = %self.addr, reply = %outcome.reply, "Command rejected");
            }

            self.send_reply(&outcome.reply).await?;

            if !outcome.keep_open {
                return Ok(());
            }
        }
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.out.clear();
        reply.serialize_into(&mut self.out);

        self.writer.write_all(&self.out).await?;
        self.writer.flush().await?;

        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "Sent reply");
        Ok(())
    }
}

// Runs on every exit path, including a panic while the session is polled.
impl<R, W> Drop for ConnectionHandler<R, W> {
    fn drop(&mut self) {
        self.stats.bytes_read(self.decoder.bytes_read());
        self.stats.connection_closed();
    }
}

/// Runs a session on an accepted TCP connection.
///
/// Errors are logged by the session itself; this never fails.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let (reader, writer) = stream.into_split();
    let handler = ConnectionHandler::new(reader, writer, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        trace!(client = %addr, error = %e, "Session ended with error");
    }
}

/// Spawns [`handle_connection`] on its own task and a watcher that logs the
/// session if it panics.
pub fn spawn_session(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) -> JoinHandle<()> {
    let session = tokio::spawn(handle_connection(stream, addr, command_handler, stats));
    supervise(addr, session)
}

fn supervise(addr: SocketAddr, session: JoinHandle<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = session.await {
            if e.is_panic() {
                error!(client = %addr, "Session task panicked");
            } else {
                debug!(client = %addr, error = %e, "Session task cancelled");
            }
        }
    })
}
