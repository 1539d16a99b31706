//! Tests for Segment
//!
//! These tests verify:
//! - Offset assignment from the base offset
//! - Maxed detection by index and by store size
//! - Recovery of the next offset on reopen (clean and unclean)
//! - Faulting after a failed store or index write
//! - Discarding torn or unindexed store tails on reopen
//! - File naming and removal

use std::fs::OpenOptions;
use std::io::Write;

use seglog::storage::{Segment, ENTRY_WIDTH, LEN_WIDTH};
use seglog::{Record, SeglogError, SegmentConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const VALUE: &[u8] = b"hello world";

/// Bytes one record occupies in the store
fn record_width() -> u64 {
    LEN_WIDTH + Record::new(VALUE).encode().unwrap().len() as u64
}

fn config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
    SegmentConfig {
        max_store_bytes,
        max_index_bytes,
        initial_offset: 0,
    }
}

// =============================================================================
// Append/Read Tests
// =============================================================================

#[test]
fn test_segment_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let index_limited = config(1024, ENTRY_WIDTH * 3);
    let mut segment = Segment::open(dir, 16, index_limited).unwrap();
    assert_eq!(segment.base_offset(), 16);
    assert_eq!(segment.next_offset(), 16);
    assert!(segment.is_empty());
    assert!(!segment.is_maxed());

    for i in 0..3u64 {
        let offset = segment.append(Record::new(VALUE)).unwrap();
        assert_eq!(offset, 16 + i);

        let record = segment.read(offset).unwrap();
        assert_eq!(record.value, VALUE);
        assert_eq!(record.offset, offset);
    }

    // Maxed by index
    assert!(segment.is_maxed());
    assert_eq!(segment.index_entries(), 3);
    assert_eq!(segment.store_size(), record_width() * 3);
    segment.close().unwrap();
    drop(segment);

    // Maxed by store
    let store_limited = config(record_width() * 3, 1024);
    let segment = Segment::open(dir, 16, store_limited).unwrap();
    assert_eq!(segment.next_offset(), 19);
    assert!(segment.is_maxed());

    segment.remove().unwrap();
    assert!(!Segment::store_path(dir, 16).exists());
    assert!(!Segment::index_path(dir, 16).exists());

    let segment = Segment::open(dir, 16, store_limited).unwrap();
    assert!(segment.is_empty());
    assert!(!segment.is_maxed());
}

#[test]
fn test_read_outside_range() {
    let temp_dir = TempDir::new().unwrap();
    let mut segment = Segment::open(temp_dir.path(), 10, config(1024, 1024)).unwrap();
    segment.append(Record::new(VALUE)).unwrap();

    assert!(segment.contains(10));
    assert!(!segment.contains(9));
    assert!(!segment.contains(11));

    assert!(matches!(segment.read(9), Err(SeglogError::OffsetOutOfRange(9))));
    assert!(matches!(segment.read(11), Err(SeglogError::OffsetOutOfRange(11))));
}

#[test]
fn test_append_overwrites_caller_offset() {
    let temp_dir = TempDir::new().unwrap();
    let mut segment = Segment::open(temp_dir.path(), 5, config(1024, 1024)).unwrap();

    let record = Record {
        value: VALUE.to_vec(),
        offset: 999,
    };
    let offset = segment.append(record).unwrap();

    assert_eq!(offset, 5);
    assert_eq!(segment.read(5).unwrap().offset, 5);
}

#[test]
fn test_value_bytes_round_trip_exactly() {
    let temp_dir = TempDir::new().unwrap();
    let mut segment = Segment::open(temp_dir.path(), 0, config(1024, 1024)).unwrap();

    let binary: Vec<u8> = (0..=255u8).collect();
    let empty = segment.append(Record::new(Vec::new())).unwrap();
    let full = segment.append(Record::new(binary.clone())).unwrap();

    assert!(segment.read(empty).unwrap().value.is_empty());
    assert_eq!(segment.read(full).unwrap().value, binary);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_resumes_offsets() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    {
        let mut segment = Segment::open(dir, 100, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"a".to_vec())).unwrap();
        segment.append(Record::new(b"b".to_vec())).unwrap();
    }

    let mut segment = Segment::open(dir, 100, config(1024, 1024)).unwrap();
    assert_eq!(segment.next_offset(), 102);
    assert_eq!(segment.read(101).unwrap().value, b"b");
    assert_eq!(segment.append(Record::new(b"c".to_vec())).unwrap(), 102);
}

#[test]
fn test_reopen_after_unclean_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    {
        let mut segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(VALUE)).unwrap();
        segment.append(Record::new(VALUE)).unwrap();
        segment.close().unwrap();
    }

    // Grow the index back to its preallocated size, as if never closed
    let index = OpenOptions::new()
        .write(true)
        .open(Segment::index_path(dir, 0))
        .unwrap();
    index.set_len(1024).unwrap();
    drop(index);

    let segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
    assert_eq!(segment.next_offset(), 2);
    assert_eq!(segment.read(1).unwrap().value, VALUE);
}

#[test]
fn test_unclean_empty_segment_has_no_records() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    {
        let _segment = Segment::open(dir, 7, config(1024, 1024)).unwrap();
    }

    let index = OpenOptions::new()
        .write(true)
        .open(Segment::index_path(dir, 7))
        .unwrap();
    index.set_len(1024).unwrap();
    drop(index);

    let segment = Segment::open(dir, 7, config(1024, 1024)).unwrap();
    assert!(segment.is_empty());
    assert_eq!(segment.next_offset(), 7);
}

#[test]
fn test_reopen_drops_torn_last_record() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    {
        let mut segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(VALUE)).unwrap();
        segment.append(Record::new(VALUE)).unwrap();
        segment.close().unwrap();
    }

    // The second record lost its last bytes
    let store = OpenOptions::new()
        .write(true)
        .open(Segment::store_path(dir, 0))
        .unwrap();
    store.set_len(record_width() * 2 - 3).unwrap();
    drop(store);

    let mut segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
    assert_eq!(segment.next_offset(), 1);
    assert_eq!(segment.index_entries(), 1);
    assert_eq!(segment.store_size(), record_width());
    assert!(matches!(segment.read(1), Err(SeglogError::OffsetOutOfRange(1))));

    // The offset is reassigned and the new record starts on a clean boundary
    let offset = segment.append(Record::new(b"replacement".to_vec())).unwrap();
    assert_eq!(offset, 1);
    assert_eq!(segment.read(1).unwrap().value, b"replacement");
    assert_eq!(segment.read(0).unwrap().value, VALUE);
}

#[test]
fn test_reopen_discards_unindexed_store_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    {
        let mut segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(VALUE)).unwrap();
        segment.close().unwrap();
    }

    // A record reached the store but its index entry never did
    let mut store = OpenOptions::new()
        .append(true)
        .open(Segment::store_path(dir, 0))
        .unwrap();
    store.write_all(&[0xAB; 10]).unwrap();
    drop(store);

    let mut segment = Segment::open(dir, 0, config(1024, 1024)).unwrap();
    assert_eq!(segment.next_offset(), 1);
    assert_eq!(segment.store_size(), record_width());

    assert_eq!(segment.append(Record::new(VALUE)).unwrap(), 1);
    assert_eq!(segment.read(1).unwrap().value, VALUE);
}

// =============================================================================
// Fault Tests
// =============================================================================

#[test]
fn test_index_failure_faults_segment() {
    let temp_dir = TempDir::new().unwrap();
    let mut segment = Segment::open(temp_dir.path(), 0, config(1024, ENTRY_WIDTH)).unwrap();

    assert_eq!(segment.append(Record::new(VALUE)).unwrap(), 0);

    // Store write succeeds, index has no room
    assert!(matches!(
        segment.append(Record::new(VALUE)),
        Err(SeglogError::IndexFull { .. })
    ));
    assert!(segment.is_faulted());
    assert!(segment.is_maxed());
    assert_eq!(segment.next_offset(), 1);

    // The orphaned bytes are never readable
    assert!(matches!(segment.read(1), Err(SeglogError::OffsetOutOfRange(1))));

    assert!(matches!(
        segment.append(Record::new(VALUE)),
        Err(SeglogError::SegmentFaulted { base_offset: 0 })
    ));
    assert_eq!(segment.read(0).unwrap().value, VALUE);
}

#[test]
fn test_store_failure_faults_segment() {
    let temp_dir = TempDir::new().unwrap();
    let mut segment = Segment::open(temp_dir.path(), 0, config(1024, 1024)).unwrap();
    segment.append(Record::new(VALUE)).unwrap();

    // Closed files reject the store write
    segment.close().unwrap();
    assert!(matches!(
        segment.append(Record::new(VALUE)),
        Err(SeglogError::Io(_))
    ));

    assert!(segment.is_faulted());
    assert!(segment.is_maxed());
    assert_eq!(segment.next_offset(), 1);
    assert!(matches!(
        segment.append(Record::new(VALUE)),
        Err(SeglogError::SegmentFaulted { base_offset: 0 })
    ));
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_file_names() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let _segment = Segment::open(dir, 42, config(1024, 1024)).unwrap();

    assert_eq!(Segment::store_path(dir, 42), dir.join("42.store"));
    assert_eq!(Segment::index_path(dir, 42), dir.join("42.index"));
    assert!(dir.join("42.store").exists());
    assert!(dir.join("42.index").exists());
}
