//! Client
//!
//! Async client for the seglog protocol, over plain TCP or TLS.
//!
//! Calls are sequential on one connection. A stream handle borrows the
//! client until it is finished (produce) or cancelled (consume); dropping a
//! handle early leaves the connection in the stream state, so the client
//! should be discarded afterwards.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::error::{Result, SeglogError};
use crate::protocol::{read_response, write_command, Command, Response, Status};
use crate::record::Record;

/// Connection to a seglog server
pub struct LogClient<S = TcpStream> {
    stream: BufStream<S>,
}

impl LogClient<TcpStream> {
    /// Connect over plain TCP
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl LogClient<TlsStream<TcpStream>> {
    /// Connect and complete a TLS handshake, verifying `server_name`
    pub async fn connect_tls(
        addr: impl ToSocketAddrs,
        connector: &TlsConnector,
        server_name: &str,
    ) -> Result<Self> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| SeglogError::Tls(format!("Invalid server name {}: {}", server_name, e)))?;

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let stream = connector.connect(server_name, stream).await?;
        Ok(Self::new(stream))
    }
}

impl<S> LogClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already established stream
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Append a record, returning its offset
    pub async fn produce(&mut self, record: Record) -> Result<u64> {
        self.request(Command::Produce { record }).await?.to_offset()
    }

    /// Read the record at `offset`
    ///
    /// Fails with `SeglogError::OffsetOutOfRange` if it does not exist.
    pub async fn consume(&mut self, offset: u64) -> Result<Record> {
        self.request(Command::Consume { offset }).await?.to_record()
    }

    /// Health check
    pub async fn ping(&mut self) -> Result<()> {
        self.request(Command::Ping).await?;
        Ok(())
    }

    /// Open a produce stream
    pub async fn produce_stream(&mut self) -> Result<ProduceStream<'_, S>> {
        self.request(Command::ProduceStream).await?;
        Ok(ProduceStream {
            client: self,
            closed: false,
        })
    }

    /// Tail the log starting at `offset`
    pub async fn consume_stream(&mut self, offset: u64) -> Result<ConsumeStream<'_, S>> {
        self.send(&Command::ConsumeStream { offset }).await?;
        Ok(ConsumeStream {
            client: self,
            done: false,
        })
    }

    async fn request(&mut self, command: Command) -> Result<Response> {
        self.send(&command).await?;
        let response = self.recv().await?.into_result()?;

        if response.status != Status::Ok {
            return Err(SeglogError::Protocol(format!(
                "Unexpected {:?} reply to {:?}",
                response.status,
                command.command_type()
            )));
        }
        Ok(response)
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        write_command(&mut self.stream, command).await
    }

    async fn recv(&mut self) -> Result<Response> {
        match read_response(&mut self.stream).await {
            Err(SeglogError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(
                SeglogError::Network("connection closed by server".to_string()),
            ),
            other => other,
        }
    }
}

/// Open produce stream
///
/// Sends may run ahead of receives; acknowledgements arrive in send order.
pub struct ProduceStream<'a, S> {
    client: &'a mut LogClient<S>,
    closed: bool,
}

impl<S> ProduceStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send a record without waiting for its acknowledgement
    pub async fn send(&mut self, record: Record) -> Result<()> {
        if self.closed {
            return Err(SeglogError::Protocol("produce stream is closed".to_string()));
        }
        self.client.send(&Command::Produce { record }).await
    }

    /// Next acknowledgement: the offset of the oldest unacknowledged record
    ///
    /// A server-side failure closes the stream.
    pub async fn recv(&mut self) -> Result<u64> {
        let response = match self.client.recv().await?.into_result() {
            Ok(response) => response,
            Err(e) => {
                self.closed = true;
                return Err(e);
            }
        };

        if response.status == Status::EndOfStream {
            self.closed = true;
            return Err(SeglogError::Protocol("produce stream ended".to_string()));
        }
        response.to_offset()
    }

    /// Close the stream, discarding any acknowledgements not yet received
    pub async fn finish(self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.client.send(&Command::EndStream).await?;
        loop {
            let response = self.client.recv().await?.into_result()?;
            if response.status == Status::EndOfStream {
                return Ok(());
            }
        }
    }
}

/// Open consume stream
pub struct ConsumeStream<'a, S> {
    client: &'a mut LogClient<S>,
    done: bool,
}

impl<S> ConsumeStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Next record, waiting until it is produced
    ///
    /// Returns `Ok(None)` once the stream has ended. Not cancel-safe: a
    /// dropped call may lose a partially received record.
    pub async fn recv(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        let response = match self.client.recv().await?.into_result() {
            Ok(response) => response,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if response.status == Status::EndOfStream {
            self.done = true;
            return Ok(None);
        }
        response.to_record().map(Some)
    }

    /// Stop the stream, discarding records already in flight
    pub async fn cancel(mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }

        self.client.send(&Command::EndStream).await?;
        while self.recv().await?.is_some() {}
        Ok(())
    }
}
