//! Response definitions
//!
//! Represents responses to clients.

use crate::error::{Result, SeglogError};
use crate::record::Record;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    OffsetOutOfRange = 0x01,
    Error = 0x02,
    EndOfStream = 0x03,
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (offset, record, or error message)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// OK carrying the offset assigned to a produced record
    pub fn produced(offset: u64) -> Self {
        Self::ok(Some(offset.to_be_bytes().to_vec()))
    }

    /// OK carrying a consumed record
    pub fn consumed(record: &Record) -> Result<Self> {
        Ok(Self::ok(Some(record.encode()?)))
    }

    /// Reply to PING
    pub fn pong() -> Self {
        Self::ok(Some(b"PONG".to_vec()))
    }

    /// Create an OFFSET_OUT_OF_RANGE response
    pub fn offset_out_of_range(offset: u64) -> Self {
        Self {
            status: Status::OffsetOutOfRange,
            payload: Some(offset.to_be_bytes().to_vec()),
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create an END_OF_STREAM response
    pub fn end_of_stream() -> Self {
        Self {
            status: Status::EndOfStream,
            payload: None,
        }
    }

    // =========================================================================
    // Client-side interpretation
    // =========================================================================

    /// Turn failure statuses into errors
    ///
    /// - OFFSET_OUT_OF_RANGE → `SeglogError::OffsetOutOfRange`
    /// - ERROR → `SeglogError::Remote`
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::EndOfStream => Ok(self),
            Status::OffsetOutOfRange => {
                let offset = read_u64(self.payload_bytes())?;
                Err(SeglogError::OffsetOutOfRange(offset))
            }
            Status::Error => Err(SeglogError::Remote(
                String::from_utf8_lossy(self.payload_bytes()).into_owned(),
            )),
        }
    }

    /// Offset carried by a `produced` response
    pub fn to_offset(&self) -> Result<u64> {
        read_u64(self.payload_bytes())
    }

    /// Record carried by a `consumed` response
    pub fn to_record(&self) -> Result<Record> {
        Record::decode(self.payload_bytes())
    }

    fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }
}

fn read_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        SeglogError::Protocol(format!(
            "expected an 8-byte offset payload, got {} bytes",
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(array))
}
