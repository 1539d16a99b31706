//! Error types for seglog
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SeglogError
pub type Result<T> = std::result::Result<T, SeglogError>;

/// Unified error type for seglog operations
#[derive(Debug, Error)]
pub enum SeglogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    /// No retained record carries this offset (yet).
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),

    #[error("Log is closed")]
    Closed,

    #[error("Log directory already in use: {0}")]
    DirectoryLocked(PathBuf),

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Index has no entry at relative offset {relative} ({entries} entries)")]
    IndexOutOfRange { relative: u32, entries: u64 },

    #[error("Index full: capacity {capacity} bytes")]
    IndexFull { capacity: u64 },

    #[error("Segment {base_offset} is faulted and no longer accepts appends")]
    SegmentFaulted { base_offset: u64 },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An internal error reported by the server.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("TLS error: {0}")]
    Tls(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SeglogError {
    /// True for the "not produced yet / already truncated" condition.
    pub fn is_offset_out_of_range(&self) -> bool {
        matches!(self, SeglogError::OffsetOutOfRange(_))
    }
}

impl From<bincode::Error> for SeglogError {
    fn from(err: bincode::Error) -> Self {
        SeglogError::Serialization(err.to_string())
    }
}
