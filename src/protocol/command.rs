//! Command definitions
//!
//! Represents commands from clients.

use crate::record::Record;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Produce = 0x01,
    Consume = 0x02,
    ProduceStream = 0x03,
    ConsumeStream = 0x04,
    EndStream = 0x05,
    Ping = 0x06,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append a record
    Produce { record: Record },

    /// Read the record at an offset
    Consume { offset: u64 },

    /// Open a produce stream on this connection
    ProduceStream,

    /// Tail the log starting at an offset
    ConsumeStream { offset: u64 },

    /// Close the open produce stream or cancel the open consume stream
    EndStream,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Produce { .. } => CommandType::Produce,
            Command::Consume { .. } => CommandType::Consume,
            Command::ProduceStream => CommandType::ProduceStream,
            Command::ConsumeStream { .. } => CommandType::ConsumeStream,
            Command::EndStream => CommandType::EndStream,
            Command::Ping => CommandType::Ping,
        }
    }
}
