//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frame Format (both directions)
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Type (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: PRODUCE        - Payload: record (bincode)
//! - 0x02: CONSUME        - Payload: offset (8)
//! - 0x03: PRODUCE_STREAM - Payload: empty
//! - 0x04: CONSUME_STREAM - Payload: starting offset (8)
//! - 0x05: END_STREAM     - Payload: empty
//! - 0x06: PING           - Payload: empty
//!
//! ### Status Codes
//! - 0x00: OK                  - Payload: offset (8), record (bincode), or empty
//! - 0x01: OFFSET_OUT_OF_RANGE - Payload: requested offset (8)
//! - 0x02: ERROR               - Payload: message
//! - 0x03: END_OF_STREAM       - Payload: empty
//!
//! ### Streams
//! `PRODUCE_STREAM` is acknowledged with an empty OK; every following
//! `PRODUCE` gets exactly one response, in order, until `END_STREAM`
//! (answered with `END_OF_STREAM`) or the first ERROR.
//!
//! `CONSUME_STREAM` makes the server push one OK record frame per offset,
//! waiting whenever the next offset does not exist yet, until the client
//! sends `END_STREAM` or disconnects.

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
