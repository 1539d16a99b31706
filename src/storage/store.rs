//! Store
//!
//! Append-only file of length-prefixed payloads.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

/// Width of the big-endian length prefix in front of every payload
pub const LEN_WIDTH: u64 = 8;

/// Append-only record file
///
/// Writes go through a `BufWriter`; every read flushes first so a record is
/// visible as soon as `append` returns.
pub struct Store {
    /// Path of the backing file
    path: PathBuf,

    /// Writer and logical size, guarded together
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    /// `None` once the store has been closed
    writer: Option<BufWriter<File>>,

    /// Bytes written so far (including buffered ones)
    size: u64,
}

impl Store {
    /// Open or create a store file
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    /// Append a payload
    ///
    /// Returns `(bytes_written, position)`; `bytes_written` includes the
    /// length prefix, so `position + bytes_written` is the next position.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;

        let writer = inner.writer.as_mut().ok_or_else(closed)?;
        let result = writer
            .write_all(&(payload.len() as u64).to_be_bytes())
            .and_then(|()| writer.write_all(payload));

        if let Err(e) = result {
            if let Err(rollback) = inner.rollback() {
                tracing::error!(
                    "Store {} could not discard a failed append, closing it: {}",
                    self.path.display(),
                    rollback
                );
            }
            return Err(e.into());
        }

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;

        Ok((written, position))
    }

    /// Read the payload stored at `position`
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;

        if position.saturating_add(LEN_WIDTH) > size {
            return Err(eof(position).into());
        }

        let writer = inner.writer.as_mut().ok_or_else(closed)?;
        writer.flush()?;

        let file = writer.get_mut();
        file.seek(SeekFrom::Start(position))?;

        let mut len_bytes = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_be_bytes(len_bytes);

        // A length running past the end means a torn or corrupt entry
        if position.saturating_add(LEN_WIDTH).saturating_add(len) > size {
            return Err(eof(position).into());
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        Ok(payload)
    }

    /// Read raw file bytes starting at `offset`
    ///
    /// Returns `Ok(0)` at end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        let size = inner.size;

        if offset >= size || buf.is_empty() {
            return Ok(0);
        }

        let writer = inner.writer.as_mut().ok_or_else(closed_io)?;
        writer.flush()?;

        let file = writer.get_mut();
        file.seek(SeekFrom::Start(offset))?;

        let want = buf.len().min((size - offset) as usize);
        file.read(&mut buf[..want])
    }

    /// Flush buffered writes and fsync
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Drop every byte from `size` onwards
    ///
    /// Used on open to cut off a torn or unindexed tail.
    pub fn truncate(&self, size: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if size >= inner.size {
            return Ok(());
        }

        let writer = inner.writer.as_mut().ok_or_else(closed)?;
        writer.flush()?;
        writer.get_ref().set_len(size)?;
        inner.size = size;

        Ok(())
    }

    /// Flush and release the file handle (idempotent)
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Logical size in bytes
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreInner {
    /// Bring the file back to exactly `size` bytes after a failed append
    ///
    /// Bytes of earlier appends still sitting in the buffer are written out,
    /// the fragment of the failed entry is discarded. On error the writer
    /// is dropped and the store behaves as closed.
    fn rollback(&mut self) -> io::Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let (mut file, buffered) = writer.into_parts();
        let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = file.metadata()?.len();
        if on_disk < self.size {
            let missing = (self.size - on_disk) as usize;
            if missing > buffered.len() {
                return Err(io::Error::other("store lost buffered bytes"));
            }
            file.write_all(&buffered[..missing])?;
        }
        file.set_len(self.size)?;

        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

fn closed_io() -> io::Error {
    io::Error::other("store is closed")
}

fn closed() -> crate::SeglogError {
    closed_io().into()
}

fn eof(position: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("no complete record at store position {}", position),
    )
}
