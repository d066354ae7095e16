//! Tests for FileStore
//!
//! These tests verify:
//! - Writes read back in order
//! - Rotation to a new file when the size limit is reached
//! - Resuming the newest file on reopen
//! - Closed stores reject writes

use std::fs;

use relaykv::config::WalSyncStrategy;
use relaykv::wal::FileStore;
use relaykv::RelayError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(dir: &TempDir, max_file_size: u64) -> FileStore {
    FileStore::open(dir.path(), max_file_size, WalSyncStrategy::EveryWrite).unwrap()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_open_empty_dir_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);

    assert!(store.files().unwrap().is_empty());
    assert!(store.read_all().unwrap().is_empty());
}

#[test]
fn test_write_read_back() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);

    assert_eq!(store.write(b"hello ").unwrap(), 6);
    assert_eq!(store.write(b"world").unwrap(), 5);

    assert_eq!(store.read_all().unwrap(), b"hello world");
    assert_eq!(store.current_file_size(), 11);
}

#[test]
fn test_oversized_write_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let data = pattern(1000, 7);

    let store = open(&dir, 10);
    store.write(&data).unwrap();
    store.close().unwrap();

    let store = open(&dir, 10);
    assert_eq!(store.read_all().unwrap(), data);
    store.close().unwrap();
}

#[test]
fn test_rotation_never_splits_a_write() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 100);

    let chunks: Vec<Vec<u8>> = (0..10).map(|i| pattern(40, i)).collect();
    for chunk in &chunks {
        store.write(chunk).unwrap();
    }

    // 40 + 40 fits, a third would pass 100
    let files = store.files().unwrap();
    assert_eq!(files.len(), 5);
    for file in &files {
        assert_eq!(fs::metadata(file).unwrap().len(), 80);
    }

    assert_eq!(store.read_all().unwrap(), chunks.concat());
}

#[test]
fn test_file_names_sort_in_creation_order() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1);
    for i in 0..3 {
        store.write(&[i]).unwrap();
    }

    let names: Vec<String> = store
        .files()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["wal_0000000001.bin", "wal_0000000002.bin", "wal_0000000003.bin"]
    );
}

#[test]
fn test_listing_order_holds_past_four_digits() {
    let dir = TempDir::new().unwrap();
    // Resume from a file at sequence 9999
    fs::write(dir.path().join("wal_0000009999.bin"), b"").unwrap();

    let store = open(&dir, 1);
    for i in 0..3 {
        store.write(&[i]).unwrap();
    }

    let files = store.files().unwrap();
    let mut listed: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    listed.sort();

    let ordered: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(listed, ordered);
    assert_eq!(ordered.last().unwrap(), "wal_0000010001.bin");
}

#[test]
fn test_narrow_legacy_names_are_discovered() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("wal_0001.bin"), b"old").unwrap();

    let store = open(&dir, 1024);
    assert_eq!(store.files().unwrap().len(), 1);
    assert_eq!(store.read_all().unwrap(), b"old");
}

#[test]
fn test_reopen_appends_to_last_file() {
    let dir = TempDir::new().unwrap();

    let store = open(&dir, 1024);
    store.write(b"first").unwrap();
    store.close().unwrap();

    let store = open(&dir, 1024);
    assert_eq!(store.current_file_size(), 5);
    store.write(b"second").unwrap();

    assert_eq!(store.files().unwrap().len(), 1);
    assert_eq!(store.read_all().unwrap(), b"firstsecond");
}

#[test]
fn test_reopen_rotates_when_last_file_is_full() {
    let dir = TempDir::new().unwrap();

    let store = open(&dir, 8);
    store.write(b"12345678").unwrap();
    store.close().unwrap();

    let store = open(&dir, 8);
    store.write(b"abc").unwrap();

    assert_eq!(store.files().unwrap().len(), 2);
    assert_eq!(store.read_all().unwrap(), b"12345678abc");
}

#[test]
fn test_truncate_tail() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    store.write(b"keep-this-torn").unwrap();

    store.truncate_tail(5).unwrap();
    assert_eq!(store.read_all().unwrap(), b"keep-this");
    assert_eq!(store.current_file_size(), 9);

    store.write(b"!").unwrap();
    assert_eq!(store.read_all().unwrap(), b"keep-this!");
}

#[test]
fn test_closed_store_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    store.close().unwrap();

    assert!(matches!(store.write(b"late"), Err(RelayError::Closed)));
    // Closing twice is fine
    store.close().unwrap();
}
