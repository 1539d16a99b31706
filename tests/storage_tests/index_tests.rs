//! Tests for Index
//!
//! These tests verify:
//! - Entry writes and lookups
//! - Capacity limits (including caps that are not a multiple of an entry)
//! - Shrink-on-close and reopen
//! - Recovery from an index that was never closed

use std::fs;
use std::path::PathBuf;

use seglog::storage::{Index, ENTRY_WIDTH};
use seglog::SeglogError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_index() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("0.index");
    (temp_dir, path)
}

fn encode_entry(relative: u32, position: u64) -> Vec<u8> {
    let mut entry = relative.to_be_bytes().to_vec();
    entry.extend_from_slice(&position.to_be_bytes());
    entry
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_empty_index() {
    let (_temp, path) = setup_temp_index();
    let index = Index::open(&path, 1024).unwrap();

    assert_eq!(index.entries(), 0);
    assert_eq!(index.size(), 0);
    assert!(index.last().unwrap().is_none());

    match index.read(0) {
        Err(SeglogError::IndexOutOfRange { relative, entries }) => {
            assert_eq!(relative, 0);
            assert_eq!(entries, 0);
        }
        other => panic!("Expected IndexOutOfRange, got {:?}", other),
    }
}

#[test]
fn test_write_read() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, 1024).unwrap();

    let entries = [(0u32, 0u64), (1, 10), (2, 35)];
    for (relative, position) in entries {
        index.write(relative, position).unwrap();
    }

    for (relative, position) in entries {
        assert_eq!(index.read(relative).unwrap(), position);
    }

    assert_eq!(index.entries(), 3);
    assert_eq!(index.size(), 3 * ENTRY_WIDTH);
    assert_eq!(index.last().unwrap(), Some((2, 35)));
    assert!(matches!(
        index.read(3),
        Err(SeglogError::IndexOutOfRange { relative: 3, entries: 3 })
    ));
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_full_index_rejects_writes() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, 3 * ENTRY_WIDTH).unwrap();

    for relative in 0..3u32 {
        assert!(!index.is_full());
        index.write(relative, relative as u64 * 20).unwrap();
    }

    assert!(index.is_full());
    assert!(matches!(index.write(3, 60), Err(SeglogError::IndexFull { .. })));
    assert_eq!(index.entries(), 3);
}

#[test]
fn test_capacity_not_multiple_of_entry() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, 2 * ENTRY_WIDTH + 6).unwrap();

    index.write(0, 0).unwrap();
    index.write(1, 20).unwrap();

    assert!(index.is_full());
    assert!(matches!(index.write(2, 40), Err(SeglogError::IndexFull { .. })));
}

// =============================================================================
// Close/Reopen Tests
// =============================================================================

#[test]
fn test_file_preallocated_while_open() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, 1024).unwrap();
    index.write(0, 0).unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), 1024);
    assert_eq!(index.capacity(), 1024);
}

#[test]
fn test_close_truncates_to_size() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, 1024).unwrap();
    index.write(0, 0).unwrap();
    index.write(1, 19).unwrap();

    index.close().unwrap();
    index.close().unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * ENTRY_WIDTH);
}

#[test]
fn test_reopen_restores_entries() {
    let (_temp, path) = setup_temp_index();

    {
        let mut index = Index::open(&path, 1024).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        // Dropped without an explicit close
    }

    let mut index = Index::open(&path, 1024).unwrap();
    assert_eq!(index.entries(), 2);
    assert_eq!(index.last().unwrap(), Some((1, 19)));

    index.write(2, 38).unwrap();
    assert_eq!(index.read(2).unwrap(), 38);
}

#[test]
fn test_reopen_with_smaller_cap_keeps_entries() {
    let (_temp, path) = setup_temp_index();

    {
        let mut index = Index::open(&path, 1024).unwrap();
        for relative in 0..4u32 {
            index.write(relative, relative as u64 * 10).unwrap();
        }
    }

    let index = Index::open(&path, 2 * ENTRY_WIDTH).unwrap();
    assert_eq!(index.entries(), 4);
    assert!(index.is_full());
    assert_eq!(index.read(3).unwrap(), 30);
}

#[test]
fn test_unclosed_index_drops_zeroed_slots() {
    let (_temp, path) = setup_temp_index();

    // What a crash leaves behind: two real entries, then preallocated zeros
    let mut bytes = encode_entry(0, 0);
    bytes.extend(encode_entry(1, 27));
    bytes.resize(1024, 0);
    fs::write(&path, &bytes).unwrap();

    let index = Index::open(&path, 1024).unwrap();
    assert_eq!(index.entries(), 2);
    assert_eq!(index.last().unwrap(), Some((1, 27)));
}
