//! Index
//!
//! Fixed-width entry file mapping relative offsets to store positions.
//!
//! Entry `i` always describes the record at `base_offset + i`, so a lookup
//! is a multiplication, not a search. The file is memory-mapped at its full
//! capacity while open; only the first `size` bytes hold real entries.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{Result, SeglogError};

/// Width of the relative offset field
pub const OFFSET_WIDTH: u64 = 4;

/// Width of the store position field
pub const POSITION_WIDTH: u64 = 8;

/// Width of a full index entry
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Memory-mapped offset index
pub struct Index {
    /// Path of the backing file
    path: PathBuf,

    /// Backing file, kept open so `close` can shrink it
    file: File,

    /// Mapping over the preallocated region; `None` once closed
    mmap: Option<MmapMut>,

    /// Bytes used by real entries
    size: u64,

    /// Preallocated bytes
    capacity: u64,
}

impl Index {
    /// Open or create an index file with room for `max_bytes` of entries
    ///
    /// The current file length is taken as the used size (it was truncated
    /// to exactly that on the last close), then the file is grown to its
    /// capacity and mapped. Zeroed slots left behind by an unclean shutdown
    /// are dropped, except slot 0, which only the segment can validate.
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let mut size = file.metadata()?.len();
        if size % ENTRY_WIDTH != 0 {
            tracing::warn!(
                "Index {} ends with a partial entry ({} bytes), ignoring the tail",
                path.display(),
                size % ENTRY_WIDTH
            );
            size -= size % ENTRY_WIDTH;
        }

        let capacity = max_bytes.max(size);
        if capacity < ENTRY_WIDTH {
            return Err(SeglogError::Config(format!(
                "max_index_bytes must hold at least one {}-byte entry, got {}",
                ENTRY_WIDTH, max_bytes
            )));
        }

        file.set_len(capacity)?;

        // SAFETY: the file is owned by this Index for the lifetime of the
        // mapping and is never resized while mapped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut index = Self {
            path: path.to_path_buf(),
            file,
            mmap: Some(mmap),
            size,
            capacity,
        };

        // A file that was never closed is still at full capacity, padded
        // with zeroed slots. Entry `i` must carry relative offset `i`.
        let valid = (0..index.entries())
            .take_while(|&slot| matches!(index.entry(slot), Ok((relative, _)) if relative as u64 == slot))
            .count() as u64;
        if valid < index.entries() {
            tracing::warn!(
                "Index {} has {} trailing unused slots, ignoring them",
                path.display(),
                index.entries() - valid
            );
            index.truncate(valid);
        }

        Ok(index)
    }

    /// Append an entry
    ///
    /// `relative` must equal the current entry count.
    pub fn write(&mut self, relative: u32, position: u64) -> Result<()> {
        debug_assert_eq!(relative as u64, self.entries());

        if self.is_full() {
            return Err(SeglogError::IndexFull {
                capacity: self.capacity,
            });
        }

        let mmap = self.mmap.as_mut().ok_or_else(closed)?;
        let start = self.size as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        mmap[start..mid].copy_from_slice(&relative.to_be_bytes());
        mmap[mid..end].copy_from_slice(&position.to_be_bytes());
        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Store position of the entry at `relative`
    pub fn read(&self, relative: u32) -> Result<u64> {
        let entries = self.entries();
        if relative as u64 >= entries {
            return Err(SeglogError::IndexOutOfRange { relative, entries });
        }

        let (_, position) = self.entry(relative as u64)?;
        Ok(position)
    }

    /// The most recent entry, `None` when empty
    pub fn last(&self) -> Result<Option<(u32, u64)>> {
        match self.entries() {
            0 => Ok(None),
            n => self.entry(n - 1).map(Some),
        }
    }

    fn entry(&self, slot: u64) -> Result<(u32, u64)> {
        let mmap = self.mmap.as_ref().ok_or_else(closed)?;
        let start = (slot * ENTRY_WIDTH) as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        let mut relative = [0u8; OFFSET_WIDTH as usize];
        let mut position = [0u8; POSITION_WIDTH as usize];
        relative.copy_from_slice(&mmap[start..mid]);
        position.copy_from_slice(&mmap[mid..end]);

        Ok((u32::from_be_bytes(relative), u64::from_be_bytes(position)))
    }

    /// Forget every entry from `entries` onwards
    pub fn truncate(&mut self, entries: u64) {
        self.size = self.size.min(entries * ENTRY_WIDTH);
    }

    /// True when another entry would not fit
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.capacity
    }

    /// Bytes used by entries
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entries written
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Preallocated size in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync the mapping, unmap, and shrink the file to the used size
    ///
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mmap) = self.mmap.take() {
            mmap.flush()?;
            drop(mmap);
            self.file.set_len(self.size)?;
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close index {}: {}", self.path.display(), e);
        }
    }
}

fn closed() -> SeglogError {
    SeglogError::Io(std::io::Error::other("index is closed"))
}
