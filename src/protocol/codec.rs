//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - PRODUCE:        bincode `Record` (offset field ignored by the server)
//! - CONSUME:        offset (8 bytes)
//! - CONSUME_STREAM: starting offset (8 bytes)
//! - PRODUCE_STREAM, END_STREAM, PING: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SeglogError};
use crate::record::Record;

use super::{Command, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Width of an offset payload
const OFFSET_SIZE: usize = 8;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Result<Bytes> {
    let payload = match command {
        Command::Produce { record } => record.encode()?,
        Command::Consume { offset } | Command::ConsumeStream { offset } => {
            offset.to_be_bytes().to_vec()
        }
        Command::ProduceStream | Command::EndStream | Command::Ping => Vec::new(),
    };

    frame(command.command_type() as u8, &payload)
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    match cmd_type {
        0x01 => Ok(Command::Produce {
            record: Record::decode(payload)?,
        }),
        0x02 => Ok(Command::Consume {
            offset: decode_offset("CONSUME", payload)?,
        }),
        0x03 => decode_empty("PRODUCE_STREAM", payload, Command::ProduceStream),
        0x04 => Ok(Command::ConsumeStream {
            offset: decode_offset("CONSUME_STREAM", payload)?,
        }),
        0x05 => decode_empty("END_STREAM", payload, Command::EndStream),
        0x06 => decode_empty("PING", payload, Command::Ping),
        _ => Err(SeglogError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            cmd_type
        ))),
    }
}

/// Decode an 8-byte offset payload
fn decode_offset(name: &str, mut payload: &[u8]) -> Result<u64> {
    if payload.len() != OFFSET_SIZE {
        return Err(SeglogError::Protocol(format!(
            "{} command: expected {} byte offset, got {} bytes",
            name,
            OFFSET_SIZE,
            payload.len()
        )));
    }
    Ok(payload.get_u64())
}

/// Decode a command that carries no payload
fn decode_empty(name: &str, payload: &[u8], command: Command) -> Result<Command> {
    if !payload.is_empty() {
        return Err(SeglogError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(command)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Result<Bytes> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::OffsetOutOfRange,
        0x02 => Status::Error,
        0x03 => Status::EndOfStream,
        _ => {
            return Err(SeglogError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Framing
// =============================================================================

fn frame(type_byte: u8, payload: &[u8]) -> Result<Bytes> {
    let payload_len = check_payload_len(payload.len())?;

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(type_byte);
    message.put_u32(payload_len);
    message.put_slice(payload);

    Ok(message.freeze())
}

/// Validate a full frame and split it into type byte and payload
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(SeglogError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let type_byte = header.get_u8();
    let payload_len = check_payload_len(header.get_u32() as usize)? as usize;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(SeglogError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((type_byte, &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(len: usize) -> Result<u32> {
    if len > MAX_PAYLOAD_SIZE as usize {
        return Err(SeglogError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as u32)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + payload)
///
/// A clean EOF before the first header byte surfaces as
/// `io::ErrorKind::UnexpectedEof`.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<BytesMut> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let mut len_bytes = &header[1..];
    let payload_len = check_payload_len(len_bytes.get_u32() as usize)? as usize;

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload_len);
    message.put_slice(&header);
    message.resize(HEADER_SIZE + payload_len, 0);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..]).await?;
    }

    Ok(message)
}

/// Read a complete command from a stream
pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader).await?;
    decode_command(&message)
}

/// Write a command to a stream
pub async fn write_command<W: AsyncWrite + Unpin>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a complete response from a stream
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader).await?;
    decode_response(&message)
}

/// Write a response to a stream
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
