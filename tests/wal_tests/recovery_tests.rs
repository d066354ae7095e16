//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from an empty store
//! - Recovery across several files
//! - Torn tail handling in Strict and TruncateTornTail modes
//! - Corruption other than truncation is always fatal
//! - Verify mode (stats only)

use relaykv::config::{RecoveryMode, WalSyncStrategy};
use relaykv::protocol::{segment_to_bytes, Command};
use relaykv::wal::{FileStore, Segment, SegmentReader, WalRecovery};
use relaykv::{DecodeError, RelayError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(dir: &TempDir, max_file_size: u64) -> FileStore {
    FileStore::open(dir.path(), max_file_size, WalSyncStrategy::EveryWrite).unwrap()
}

fn segment_bytes(id: i64, commands: usize) -> Vec<u8> {
    let commands = (0..commands)
        .map(|i| Command::set(format!("key{}_{}", id, i), format!("value{}", i)))
        .collect();
    segment_to_bytes(&Segment::new(id, commands).unwrap()).unwrap().to_vec()
}

fn write_segments(store: &FileStore, ids: std::ops::RangeInclusive<i64>) {
    for id in ids {
        store.write(&segment_bytes(id, 2)).unwrap();
    }
}

// =============================================================================
// Clean Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);

    let (segments, result) = WalRecovery::recover(&store, RecoveryMode::Strict).unwrap();
    assert!(segments.is_empty());
    assert_eq!(result.segments_recovered, 0);
    assert_eq!(result.last_segment_id, 0);
    assert!(!result.was_truncated());
}

#[test]
fn test_recover_across_files() {
    let dir = TempDir::new().unwrap();
    // Small files force one segment per file
    let store = open(&dir, 64);
    write_segments(&store, 1..=5);
    assert_eq!(store.files().unwrap().len(), 5);

    let (segments, result) = WalRecovery::recover(&store, RecoveryMode::Strict).unwrap();
    let ids: Vec<i64> = segments.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(result.segments_recovered, 5);
    assert_eq!(result.commands_recovered, 10);
    assert_eq!(result.last_segment_id, 5);
}

#[test]
fn test_segment_reader_tracks_position() {
    let first = segment_bytes(1, 1);
    let mut data = first.clone();
    data.extend_from_slice(&segment_bytes(2, 3));

    let mut reader = SegmentReader::new(&data);
    assert_eq!(reader.next_segment().unwrap().unwrap().id(), 1);
    assert_eq!(reader.position(), first.len());
    assert_eq!(reader.next_segment().unwrap().unwrap().len(), 3);
    assert_eq!(reader.remaining(), 0);
    assert!(reader.next_segment().unwrap().is_none());
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_strict_mode_rejects_torn_tail() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    write_segments(&store, 1..=2);
    let torn = segment_bytes(3, 2);
    store.write(&torn[..torn.len() - 3]).unwrap();

    let result = WalRecovery::recover(&store, RecoveryMode::Strict);
    assert!(matches!(
        result,
        Err(RelayError::Decode(DecodeError::Truncated { .. }))
    ));
}

#[test]
fn test_truncate_mode_cuts_torn_tail() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    write_segments(&store, 1..=2);
    let clean_len = store.current_file_size();

    let torn = segment_bytes(3, 2);
    let partial = &torn[..torn.len() / 2];
    store.write(partial).unwrap();

    let (segments, result) =
        WalRecovery::recover(&store, RecoveryMode::TruncateTornTail).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(result.last_segment_id, 2);
    assert_eq!(result.truncated_bytes, partial.len() as u64);
    assert!(result.was_truncated());

    // The file now ends on a segment boundary
    assert_eq!(store.current_file_size(), clean_len);
    let (again, result) = WalRecovery::recover(&store, RecoveryMode::Strict).unwrap();
    assert_eq!(again.len(), 2);
    assert!(!result.was_truncated());
}

#[test]
fn test_unknown_command_type_is_fatal_in_every_mode() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    write_segments(&store, 1..=1);

    let mut corrupt = segment_bytes(2, 1);
    // First command's type byte sits right after the 12-byte header
    corrupt[12] = 0xFF;
    store.write(&corrupt).unwrap();

    for mode in [RecoveryMode::Strict, RecoveryMode::TruncateTornTail] {
        let result = WalRecovery::recover(&store, mode);
        assert!(matches!(
            result,
            Err(RelayError::Decode(DecodeError::UnknownCommandType(0xFF)))
        ));
    }
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_reports_without_modifying() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, 1024);
    write_segments(&store, 1..=3);
    let size = store.current_file_size();

    let result = WalRecovery::verify(&store).unwrap();
    assert_eq!(result.segments_recovered, 3);
    assert_eq!(result.commands_recovered, 6);
    assert_eq!(result.last_segment_id, 3);
    assert_eq!(store.current_file_size(), size);
}
