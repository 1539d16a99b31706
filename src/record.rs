//! Record definitions
//!
//! The unit that producers append and consumers read back.

use serde::{Deserialize, Serialize};

/// A single record in the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload, returned byte-for-byte on read
    pub value: Vec<u8>,

    /// Absolute offset, stamped by the segment on append
    pub offset: u64,
}

impl Record {
    /// Create a record with an unassigned offset
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    /// Serialize for storage or the wire
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a record produced by [`Record::encode`]
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
