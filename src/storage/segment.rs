//! Segment
//!
//! One store plus one index sharing a base offset.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SegmentConfig;
use crate::error::{Result, SeglogError};
use crate::record::Record;

use super::{Index, Store, LEN_WIDTH};

/// File extension of store files
pub(super) const STORE_EXT: &str = "store";

/// File extension of index files
pub(super) const INDEX_EXT: &str = "index";

/// A contiguous offset range `[base_offset, next_offset)` of the log
///
/// Appends are sequenced store-then-index: an index entry is written only
/// after its record bytes are in the store, so every indexed position is
/// readable.
pub struct Segment {
    /// Record bytes (shared with `LogReader` snapshots)
    store: Arc<Store>,

    /// Relative offset → store position
    index: Index,

    /// Offset of the first record in this segment
    base_offset: u64,

    /// Offset the next append will receive
    next_offset: u64,

    /// Rotation limits
    config: SegmentConfig,

    /// Set when a store or index write failed; no further appends
    faulted: bool,
}

impl Segment {
    /// Open or create the segment with `base_offset` inside `dir`
    ///
    /// An existing index resumes offset assignment after its last entry.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> Result<Self> {
        let store = Store::open(&Self::store_path(dir, base_offset))?;
        let mut index = Index::open(&Self::index_path(dir, base_offset), config.max_index_bytes)?;

        // After a crash the last indexed record may be missing or torn, and
        // the store may hold bytes that were never indexed.
        let mut end = 0;
        while let Some((relative, position)) = index.last()? {
            match store.read(position) {
                Ok(payload) => {
                    end = position + LEN_WIDTH + payload.len() as u64;
                    break;
                }
                Err(SeglogError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        "Segment {} index entry {} has no complete record, dropping it",
                        base_offset,
                        relative
                    );
                    index.truncate(relative as u64);
                }
                Err(e) => return Err(e),
            }
        }

        if store.size() > end {
            tracing::warn!(
                "Segment {} store has {} bytes past its last record, discarding them",
                base_offset,
                store.size() - end
            );
            store.truncate(end)?;
        }

        let next_offset = match index.last()? {
            Some((relative, _)) => base_offset + relative as u64 + 1,
            None => base_offset,
        };

        tracing::debug!(
            "Opened segment {} (next offset {}, store {} bytes, {} index entries)",
            base_offset,
            next_offset,
            store.size(),
            index.entries()
        );

        Ok(Self {
            store: Arc::new(store),
            index,
            base_offset,
            next_offset,
            config,
            faulted: false,
        })
    }

    /// Append a record, returning the offset it was assigned
    pub fn append(&mut self, mut record: Record) -> Result<u64> {
        if self.faulted {
            return Err(SeglogError::SegmentFaulted {
                base_offset: self.base_offset,
            });
        }

        let offset = self.next_offset;
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| {
            SeglogError::IndexFull {
                capacity: self.index.capacity(),
            }
        })?;

        record.offset = offset;
        let bytes = record.encode()?;

        let (_, position) = match self.store.append(&bytes) {
            Ok(appended) => appended,
            Err(e) => {
                tracing::warn!(
                    "Store write failed for offset {} in segment {}: {}",
                    offset,
                    self.base_offset,
                    e
                );
                self.faulted = true;
                return Err(e);
            }
        };

        // The record bytes are already in the store; without an index entry
        // they can never be read, so seal the segment and let the log rotate.
        if let Err(e) = self.index.write(relative, position) {
            tracing::warn!(
                "Index write failed for offset {} in segment {}: {}",
                offset,
                self.base_offset,
                e
            );
            self.faulted = true;
            return Err(e);
        }

        self.next_offset += 1;
        Ok(offset)
    }

    /// Read the record at absolute `offset`
    pub fn read(&self, offset: u64) -> Result<Record> {
        if !self.contains(offset) {
            return Err(SeglogError::OffsetOutOfRange(offset));
        }

        let position = self.index.read((offset - self.base_offset) as u32)?;
        let bytes = self.store.read(position)?;

        Record::decode(&bytes)
    }

    /// True when `offset` lies in `[base_offset, next_offset)`
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// True once either file reached its limit (or the segment is faulted)
    pub fn is_maxed(&self) -> bool {
        self.faulted
            || self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Close both files
    pub fn close(&mut self) -> Result<()> {
        self.store.close()?;
        self.index.close()?;
        Ok(())
    }

    /// Close, then delete both files
    pub fn remove(mut self) -> Result<()> {
        self.close()?;
        fs::remove_file(self.index.path())?;
        fs::remove_file(self.store.path())?;

        tracing::debug!("Removed segment {}", self.base_offset);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// True when no record has been appended yet
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Store size in bytes
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Number of index entries
    pub fn index_entries(&self) -> u64 {
        self.index.entries()
    }

    pub(super) fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    // =========================================================================
    // File Naming
    // =========================================================================

    /// "{dir}/{base_offset}.store"
    pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
        dir.join(format!("{}.{}", base_offset, STORE_EXT))
    }

    /// "{dir}/{base_offset}.index"
    pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
        dir.join(format!("{}.{}", base_offset, INDEX_EXT))
    }

    /// "42.store" / "42.index" → Some(42)
    pub(super) fn parse_base_offset(path: &Path) -> Option<u64> {
        let ext = path.extension()?.to_str()?;
        if ext != STORE_EXT && ext != INDEX_EXT {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}
