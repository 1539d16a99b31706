//! Log Service
//!
//! Produce/Consume semantics on top of a shared [`Log`], independent of the
//! transport.
//!
//! ## Responsibilities
//! - Append and read records
//! - Publish the next offset after every successful produce
//! - Translate storage errors into wire responses (the only place where
//!   error kinds become status codes)
//! - Wait for not-yet-produced offsets on behalf of consume streams

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::StreamConfig;
use crate::error::{Result, SeglogError};
use crate::protocol::{Command, Response};
use crate::record::Record;
use crate::storage::Log;

/// Shared request handler for every connection
pub struct LogService {
    /// The underlying log (shared with whoever opened it)
    log: Arc<Log>,

    /// Next offset to be assigned, as last observed by this service
    appended: watch::Sender<u64>,

    /// Consume-stream retry tuning
    stream: StreamConfig,
}

impl LogService {
    pub fn new(log: Arc<Log>, stream: StreamConfig) -> Self {
        let next = log
            .highest_offset()
            .map_or_else(|| log.lowest_offset(), |highest| highest + 1);
        let (appended, _) = watch::channel(next);

        Self {
            log,
            appended,
            stream,
        }
    }

    /// Append a record and wake any waiting consume streams
    pub fn produce(&self, record: Record) -> Result<u64> {
        let offset = self.log.append(record)?;

        // Concurrent producers may finish out of order; only move forward.
        self.appended.send_if_modified(|next| {
            if offset + 1 > *next {
                *next = offset + 1;
                true
            } else {
                false
            }
        });

        tracing::trace!("Produced offset {}", offset);
        Ok(offset)
    }

    /// Read the record at `offset`
    pub fn consume(&self, offset: u64) -> Result<Record> {
        self.log.read(offset)
    }

    /// Execute a single request/response command
    ///
    /// Stream commands are driven by the connection, not here.
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Produce { record } => match self.produce(record) {
                Ok(offset) => Response::produced(offset),
                Err(e) => Self::error_response(&e),
            },
            Command::Consume { offset } => {
                match self.consume(offset).and_then(|record| Response::consumed(&record)) {
                    Ok(response) => response,
                    Err(e) => Self::error_response(&e),
                }
            }
            Command::Ping => Response::pong(),
            other => Response::error(&format!(
                "{:?} is not valid outside a stream",
                other.command_type()
            )),
        }
    }

    /// Wait until the record at `offset` exists and return it
    ///
    /// Retries while the offset is out of range, sleeping with a bounded
    /// backoff that an append notification cuts short. Any other error is
    /// returned. Dropping the future cancels the wait.
    pub async fn next_record(
        &self,
        offset: u64,
        appended: &mut watch::Receiver<u64>,
        backoff: &mut Backoff,
    ) -> Result<Record> {
        loop {
            match self.consume(offset) {
                Ok(record) => {
                    backoff.reset();
                    return Ok(record);
                }
                Err(e) if e.is_offset_out_of_range() => {
                    backoff.wait(appended).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Map an error to its wire response
    ///
    /// Out-of-range keeps its own status so clients can tell "not there
    /// (yet)" apart from server faults.
    pub fn error_response(err: &SeglogError) -> Response {
        match err {
            SeglogError::OffsetOutOfRange(offset) => Response::offset_out_of_range(*offset),
            other => {
                tracing::warn!("Internal error returned to client: {}", other);
                Response::error(&other.to_string())
            }
        }
    }

    /// Subscribe to append notifications
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }

    /// Fresh backoff state for one consume stream
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.stream)
    }

    /// The underlying log
    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }
}

/// Doubling retry delay, capped at `max_backoff_ms`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(config: StreamConfig) -> Self {
        let initial = Duration::from_millis(config.poll_interval_ms.max(1));
        let max = Duration::from_millis(config.max_backoff_ms).max(initial);

        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay used by the next wait
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Sleep for the current delay or until an append is published
    ///
    /// Returns `true` when woken by a notification. A timeout doubles the
    /// next delay.
    pub async fn wait(&mut self, appended: &mut watch::Receiver<u64>) -> bool {
        match tokio::time::timeout(self.current, appended.changed()).await {
            Ok(Ok(())) => {
                self.reset();
                true
            }
            Ok(Err(_)) => {
                // Publisher gone: plain polling from here on
                tokio::time::sleep(self.current).await;
                self.grow();
                false
            }
            Err(_) => {
                self.grow();
                false
            }
        }
    }

    fn grow(&mut self) {
        self.current = (self.current * 2).min(self.max);
    }
}
