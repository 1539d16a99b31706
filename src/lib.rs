//! # seglog
//!
//! A single-node, append-only commit log with:
//! - Segmented storage (length-prefixed store + memory-mapped index)
//! - Offset-addressed reads and retention by truncation
//! - Crash-tolerant reopen (offsets recovered from the index files)
//! - Framed TCP/TLS protocol with produce/consume streams
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TCP / TLS Server                           │
//! │            (Produce, Consume, Streams, Ping)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     LogService                               │
//! │        (error translation, append notification)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Log                                  │
//! │            (RwLock over ordered segments)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │   Segment (per range)   │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Store    │          │    Index    │
//!   │  (Append)   │          │   (mmap)    │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;

pub mod storage;
pub mod protocol;
pub mod service;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SeglogError};
pub use config::{Config, SegmentConfig, StreamConfig};
pub use record::Record;
pub use storage::{Log, LogReader};
pub use service::LogService;
pub use network::{LogClient, Server, ServerHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of seglog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
