//! Connection Handler
//!
//! Handles individual client connections.
//!
//! ## States
//! ```text
//!            PRODUCE_STREAM              CONSUME_STREAM
//!   Producing ◄─────────────── Idle ─────────────────► Consuming
//!       │                      ▲  ▲                        │
//!       └── END_STREAM / error ┘  └── END_STREAM / error ──┘
//! ```
//! Disconnects, server shutdown, and protocol violations close the
//! connection from any state.
//!
//! Commands are read by a dedicated task and handed over through a channel,
//! so waiting for the next command can be raced against a consume stream
//! without losing partially read frames.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Result, SeglogError};
use crate::protocol::{read_command, write_response, Command, Response};
use crate::service::LogService;

/// Commands buffered between the reader task and the handler
const COMMAND_BUFFER: usize = 64;

/// Handles a single client connection
pub struct Connection<S> {
    /// Buffered write half of the stream
    writer: BufWriter<WriteHalf<S>>,

    /// Commands decoded by the reader task; closed on disconnect
    commands: mpsc::Receiver<Result<Command>>,

    /// Task owning the read half
    reader_task: JoinHandle<()>,

    /// Shared request handler
    service: Arc<LogService>,

    /// Flips to `true` when the server shuts down
    shutdown: watch::Receiver<bool>,

    /// Peer address for logging
    peer_addr: String,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a new connection handler
    ///
    /// Splits the stream and starts the reader task.
    pub fn new(
        stream: S,
        peer_addr: String,
        service: Arc<LogService>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);

        let reader_task = tokio::spawn(read_commands(
            BufReader::new(read_half),
            sender,
            peer_addr.clone(),
        ));

        Self {
            writer: BufWriter::new(write_half),
            commands,
            reader_task,
            service,
            shutdown,
            peer_addr,
        }
    }

    /// Handle the connection until it is closed
    ///
    /// Returns `Ok(())` when the client disconnects or the server shuts
    /// down, and an error on protocol violations or I/O faults.
    pub async fn handle(mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let result = match self.serve().await {
            Err(SeglogError::Io(ref e)) if is_disconnect(e) => {
                tracing::debug!("Client {} went away mid-response: {}", self.peer_addr, e);
                Ok(())
            }
            other => other,
        };

        tracing::debug!("Connection from {} closed", self.peer_addr);
        result
    }

    // =========================================================================
    // States
    // =========================================================================

    /// Idle state: unary commands and stream openings
    async fn serve(&mut self) -> Result<()> {
        while let Some(command) = self.next_command().await? {
            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            let keep_open = match command {
                Command::ProduceStream => self.produce_stream().await?,
                Command::ConsumeStream { offset } => self.consume_stream(offset).await?,
                Command::EndStream => {
                    return Err(self.reject("END_STREAM without an open stream").await);
                }
                unary => {
                    let response = self.service.execute(unary);
                    self.send(response).await?;
                    true
                }
            };

            if !keep_open {
                break;
            }
        }

        Ok(())
    }

    /// Producing state: one response per PRODUCE, in order
    ///
    /// Returns `false` if the connection should close.
    async fn produce_stream(&mut self) -> Result<bool> {
        tracing::debug!("Produce stream opened by {}", self.peer_addr);
        self.send(Response::ok(None)).await?;

        while let Some(command) = self.next_command().await? {
            match command {
                Command::Produce { record } => match self.service.produce(record) {
                    Ok(offset) => self.send(Response::produced(offset)).await?,
                    Err(e) => {
                        self.send(LogService::error_response(&e)).await?;
                        tracing::debug!("Produce stream from {} aborted: {}", self.peer_addr, e);
                        return Ok(true);
                    }
                },
                Command::EndStream => {
                    self.send(Response::end_of_stream()).await?;
                    tracing::debug!("Produce stream from {} closed", self.peer_addr);
                    return Ok(true);
                }
                other => {
                    let message = format!("{:?} is not valid in a produce stream", other.command_type());
                    return Err(self.reject(&message).await);
                }
            }
        }

        Ok(false)
    }

    /// Consuming state: push records from `offset` onwards
    ///
    /// Waits for offsets that do not exist yet. Returns `false` if the
    /// connection should close.
    async fn consume_stream(&mut self, mut offset: u64) -> Result<bool> {
        tracing::debug!("Consume stream opened by {} at offset {}", self.peer_addr, offset);

        let service = Arc::clone(&self.service);
        let mut appended = service.subscribe();
        let mut backoff = service.backoff();

        loop {
            let received = tokio::select! {
                biased;

                received = self.commands.recv() => received,

                _ = wait_for_shutdown(&mut self.shutdown) => {
                    tracing::debug!("Consume stream for {} cancelled by shutdown", self.peer_addr);
                    return Ok(false);
                }

                next = service.next_record(offset, &mut appended, &mut backoff) => {
                    match next.and_then(|record| Response::consumed(&record)) {
                        Ok(response) => {
                            self.send(response).await?;
                            offset += 1;
                            continue;
                        }
                        Err(e) => {
                            self.send(LogService::error_response(&e)).await?;
                            tracing::debug!("Consume stream for {} ended: {}", self.peer_addr, e);
                            return Ok(true);
                        }
                    }
                }
            };

            return match self.accept(received).await? {
                Some(Command::EndStream) => {
                    self.send(Response::end_of_stream()).await?;
                    tracing::debug!(
                        "Consume stream for {} cancelled at offset {}",
                        self.peer_addr,
                        offset
                    );
                    Ok(true)
                }
                Some(other) => {
                    let message = format!("{:?} is not valid in a consume stream", other.command_type());
                    Err(self.reject(&message).await)
                }
                None => {
                    tracing::debug!("Client {} left its consume stream", self.peer_addr);
                    Ok(false)
                }
            };
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Wait for the next command; `None` on disconnect or shutdown
    async fn next_command(&mut self) -> Result<Option<Command>> {
        let received = tokio::select! {
            received = self.commands.recv() => received,
            _ = wait_for_shutdown(&mut self.shutdown) => {
                tracing::debug!("Closing connection from {} for shutdown", self.peer_addr);
                return Ok(None);
            }
        };

        self.accept(received).await
    }

    /// Unwrap a value from the reader task, answering read errors
    async fn accept(&mut self, received: Option<Result<Command>>) -> Result<Option<Command>> {
        match received {
            Some(Ok(command)) => Ok(Some(command)),
            Some(Err(e)) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                // Best effort; the connection is closed either way
                let _ = self.send(Response::error(&e.to_string())).await;
                Err(e)
            }
            None => Ok(None),
        }
    }

    /// Answer a protocol violation and produce the error that closes the connection
    async fn reject(&mut self, message: &str) -> SeglogError {
        tracing::warn!("Protocol violation from {}: {}", self.peer_addr, message);
        let _ = self.send(Response::error(message)).await;
        SeglogError::Protocol(message.to_string())
    }

    /// Send a response to the client
    async fn send(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response).await
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Reader task: decode commands until EOF or the first error
async fn read_commands<R>(mut reader: R, commands: mpsc::Sender<Result<Command>>, peer_addr: String)
where
    R: AsyncRead + Unpin,
{
    loop {
        let command = match read_command(&mut reader).await {
            Err(SeglogError::Io(ref e)) if is_disconnect(e) => {
                tracing::debug!("Client {} disconnected", peer_addr);
                return;
            }
            other => other,
        };

        let failed = command.is_err();
        if commands.send(command).await.is_err() || failed {
            return;
        }
    }
}

pub(super) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
