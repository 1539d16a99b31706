//! Storage Module
//!
//! Segmented, append-only commit log.
//!
//! ## Responsibilities
//! - Persist length-prefixed records in append-only store files
//! - Map relative offsets to store positions through fixed-width index files
//! - Rotate the active segment once it reaches its size limits
//! - Recover the segment list (and each segment's next offset) on startup
//! - Drop whole segments that fall below a retention point
//!
//! ## Directory Layout
//! ```text
//! {dir}/
//!   ├── LOCK                 (exclusive advisory lock, one Log per dir)
//!   ├── 0.store   0.index    (segment with base offset 0)
//!   ├── 16.store  16.index   (segment with base offset 16)
//!   └── ...
//! ```
//!
//! ## Store Format
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ Len (8, BE)      │ Record (bincode)             │
//! ├──────────────────┼──────────────────────────────┤
//! │ Len (8, BE)      │ Record (bincode)             │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Index Format
//! ```text
//! ┌────────────────────┬──────────────────────┐
//! │ Rel. offset (4, BE)│ Store position (8,BE)│   entry 0
//! ├────────────────────┼──────────────────────┤
//! │ Rel. offset (4, BE)│ Store position (8,BE)│   entry 1
//! └────────────────────┴──────────────────────┘
//! ```
//! The index file is preallocated to `max_index_bytes` while open and
//! truncated back to the used size on close, so the file length is the
//! persisted entry count.

mod store;
mod index;
mod segment;
mod log;

pub use store::{Store, LEN_WIDTH};
pub use index::{Index, ENTRY_WIDTH, OFFSET_WIDTH, POSITION_WIDTH};
pub use segment::Segment;
pub use log::{Log, LogReader};
