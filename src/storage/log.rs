//! Log
//!
//! Ordered list of segments covering a contiguous offset range.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Route appends to the active (last) segment, rotating once it is maxed
//! - Route reads to the segment whose range contains the offset
//! - Drop segments that lie entirely below a retention point

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};

use crate::config::SegmentConfig;
use crate::error::{Result, SeglogError};
use crate::record::Record;

use super::{Segment, Store};

/// Lock file guarding a log directory
const LOCK_FILE: &str = "LOCK";

/// The commit log
///
/// ## Concurrency:
/// - `segments`: Protected by RwLock
///   - append / truncate / reset / close take the write lock
///   - read / lowest_offset / highest_offset take the read lock
/// - Offsets are assigned under the write lock, so concurrent appends are
///   totally ordered with no gaps
/// - Segments are sorted by base offset; the last one is active
///
/// A directory is owned by at most one `Log` at a time (enforced with an
/// advisory lock on `{dir}/LOCK`).
pub struct Log {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Limits applied to every segment
    config: SegmentConfig,

    /// Segments ordered by base offset ascending
    segments: RwLock<Vec<Segment>>,

    /// Held until the log is closed
    lock_file: Mutex<Option<File>>,
}

impl Log {
    /// Open or create a log in `dir`
    ///
    /// On startup:
    /// 1. Create the directory and take the directory lock
    /// 2. Collect base offsets from existing segment file names
    /// 3. Open each segment in ascending order (recovering next offsets)
    /// 4. Start a fresh segment at `initial_offset` if none exist, or after
    ///    the last one if it is already maxed
    pub fn open(dir: impl AsRef<Path>, config: SegmentConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();

        fs::create_dir_all(&dir)?;
        let lock_file = Self::acquire_lock(&dir)?;

        let segments = Self::load_segments(&dir, config)?;

        let log = Self {
            dir,
            config,
            segments: RwLock::new(segments),
            lock_file: Mutex::new(Some(lock_file)),
        };

        tracing::info!(
            "Opened log at {} ({} segments, lowest offset {}, highest offset {:?})",
            log.dir.display(),
            log.segment_count(),
            log.lowest_offset(),
            log.highest_offset()
        );

        Ok(log)
    }

    /// Append a record, returning its offset
    ///
    /// Rotation is checked after the write, so a segment may exceed its
    /// limits by one record before a new segment takes over. A maxed active
    /// segment left behind by a failed rotation is replaced first.
    pub fn append(&self, record: Record) -> Result<u64> {
        let mut segments = self.segments.write();

        // A previous rotation failed; never write into a maxed segment
        if segments.last().is_some_and(|active| active.is_maxed()) {
            Self::roll(&self.dir, self.config, &mut segments)?;
        }

        let active = segments.last_mut().ok_or(SeglogError::Closed)?;
        let result = active.append(record);

        if active.is_maxed() {
            let base_offset = active.next_offset();
            match Segment::open(&self.dir, base_offset, self.config) {
                Ok(segment) => {
                    tracing::debug!("Rotated to new segment {}", base_offset);
                    segments.push(segment);
                }
                // The maxed segment keeps accepting writes (or rejecting them
                // if faulted); rotation is retried on the next append.
                Err(e) => tracing::warn!("Failed to rotate to segment {}: {}", base_offset, e),
            }
        }

        result
    }

    /// Read the record at `offset`
    pub fn read(&self, offset: u64) -> Result<Record> {
        let segments = self.segments.read();

        match segments.iter().find(|s| s.contains(offset)) {
            Some(segment) => segment.read(offset),
            None => Err(SeglogError::OffsetOutOfRange(offset)),
        }
    }

    /// Base offset of the oldest retained segment
    pub fn lowest_offset(&self) -> u64 {
        self.segments
            .read()
            .first()
            .map(|s| s.base_offset())
            .unwrap_or(self.config.initial_offset)
    }

    /// Offset of the newest record, `None` when the log holds no records
    pub fn highest_offset(&self) -> Option<u64> {
        let segments = self.segments.read();
        let lowest = segments.first()?.base_offset();
        let next = segments.last()?.next_offset();

        if next == lowest {
            None
        } else {
            Some(next - 1)
        }
    }

    /// Remove every segment whose records all lie below `lowest`
    ///
    /// If that includes the active segment, a fresh empty segment continues
    /// at the old next offset so offsets are never reused.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.segments.write();
        let active_pos = segments.len().saturating_sub(1);

        let below = |pos: usize, segment: &Segment| {
            segment.next_offset() <= lowest && !(pos == active_pos && segment.is_empty())
        };

        // Open the replacement before touching anything so a failure leaves
        // the log unchanged.
        let replacement = match segments.last() {
            Some(active) if below(active_pos, active) => {
                Some(Segment::open(&self.dir, active.next_offset(), self.config)?)
            }
            _ => None,
        };

        let mut kept = Vec::with_capacity(segments.len());
        let mut removed = Vec::new();
        for (pos, segment) in segments.drain(..).enumerate() {
            if below(pos, &segment) {
                removed.push(segment);
            } else {
                kept.push(segment);
            }
        }
        kept.extend(replacement);
        *segments = kept;

        tracing::debug!("Truncating {} segments below offset {}", removed.len(), lowest);
        for segment in removed {
            segment.remove()?;
        }

        Ok(())
    }

    /// Sequential reader over the raw store bytes of every segment
    ///
    /// Each call starts again from the oldest segment.
    pub fn reader(&self) -> LogReader {
        let stores = self.segments.read().iter().map(|s| s.store()).collect();
        LogReader::new(stores)
    }

    /// Close every segment and release the directory lock
    ///
    /// Further appends fail; the directory may be reopened by a new `Log`.
    pub fn close(&self) -> Result<()> {
        let mut segments = self.segments.write();
        for segment in segments.iter_mut() {
            segment.close()?;
        }

        if let Some(lock_file) = self.lock_file.lock().take() {
            if let Err(e) = FileExt::unlock(&lock_file) {
                tracing::warn!("Failed to unlock log {}: {}", self.dir.display(), e);
            }
        }
        Ok(())
    }

    /// Close the log and delete its directory
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        self.segments.write().clear();

        fs::remove_dir_all(&self.dir)?;
        tracing::debug!("Removed log at {}", self.dir.display());
        Ok(())
    }

    /// Delete every segment and start over at `initial_offset`
    pub fn reset(&self) -> Result<()> {
        let mut segments = self.segments.write();

        for segment in segments.drain(..) {
            segment.remove()?;
        }
        segments.push(Segment::open(&self.dir, self.config.initial_offset, self.config)?);

        tracing::debug!("Reset log at {}", self.dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Directory holding the segment files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective segment configuration (zero limits replaced by defaults)
    pub fn config(&self) -> SegmentConfig {
        self.config
    }

    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Base offsets of all segments, ascending
    pub fn base_offsets(&self) -> Vec<u64> {
        self.segments.read().iter().map(|s| s.base_offset()).collect()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SeglogError::DirectoryLocked(dir.to_path_buf()));
        }

        Ok(lock_file)
    }

    /// Open segments for every base offset found in `dir`
    fn load_segments(dir: &Path, config: SegmentConfig) -> Result<Vec<Segment>> {
        // Each base offset shows up twice (store + index)
        let mut base_offsets = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(base_offset) = Segment::parse_base_offset(&path) {
                    base_offsets.insert(base_offset);
                }
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(dir, base_offset, config)?);
        }

        if segments.is_empty() {
            segments.push(Segment::open(dir, config.initial_offset, config)?);
        }

        // Limits may have shrunk since the last run
        if segments.last().is_some_and(|active| active.is_maxed()) {
            Self::roll(dir, config, &mut segments)?;
        }

        Ok(segments)
    }

    /// Open a new active segment at the current next offset
    fn roll(dir: &Path, config: SegmentConfig, segments: &mut Vec<Segment>) -> Result<()> {
        let base_offset = segments
            .last()
            .map_or(config.initial_offset, |active| active.next_offset());

        segments.push(Segment::open(dir, base_offset, config)?);
        tracing::debug!("Rolled to new segment {}", base_offset);
        Ok(())
    }
}

/// Concatenated raw bytes of every store, oldest segment first
///
/// Holds its own handles to the stores, so it does not block appends.
/// Reading past the last byte returns `Ok(0)`.
pub struct LogReader {
    stores: Vec<Arc<Store>>,
    current: usize,
    position: u64,
}

impl LogReader {
    fn new(stores: Vec<Arc<Store>>) -> Self {
        Self {
            stores,
            current: 0,
            position: 0,
        }
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(store) = self.stores.get(self.current) {
            let n = store.read_at(buf, self.position)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.position = 0;
        }

        Ok(0)
    }
}
