//! Storage facade test suite
//!
//! These tests verify:
//! - Command execution through the WAL
//! - State survives a reopen
//! - Pure in-memory mode
//! - Replica role refuses client writes
//! - Replicated segments keep their ids

use std::sync::Arc;
use std::time::Duration;

use relaykv::config::{Config, WalConfig};
use relaykv::protocol::Command;
use relaykv::wal::{Segment, Wal};
use relaykv::{Engine, RelayError, Role, Storage};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .batch_timeout(Duration::from_millis(2))
        .build()
}

fn set(storage: &Storage, key: &str, value: &str) {
    assert_eq!(storage.execute(Command::set(key, value)).unwrap(), None);
}

fn get(storage: &Storage, key: &str) -> Option<Vec<u8>> {
    match storage.execute(Command::get(key)) {
        Ok(value) => value,
        Err(RelayError::NotFound) => None,
        Err(e) => panic!("unexpected error: {}", e),
    }
}

/// Storage with an explicit role over a WAL in `dir`
fn storage_with_role(dir: &TempDir, role: Role) -> Storage {
    let engine = Arc::new(Engine::new());
    let wal = Wal::open(dir.path(), &WalConfig::default(), engine.clone()).unwrap();
    Storage::new(engine, Some(Arc::new(wal)), role)
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_overwrite_and_delete() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&config(&dir)).unwrap();

    set(&storage, "a", "1");
    set(&storage, "a", "2");
    assert_eq!(get(&storage, "a"), Some(b"2".to_vec()));

    set(&storage, "b", "x");
    assert_eq!(storage.execute(Command::delete("b")).unwrap(), None);
    assert!(matches!(
        storage.execute(Command::get("b")),
        Err(RelayError::NotFound)
    ));

    storage.close().unwrap();
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let storage = Storage::open(&config(&dir)).unwrap();
        set(&storage, "a", "1");
        set(&storage, "a", "2");
        set(&storage, "b", "x");
        storage.execute(Command::delete("b")).unwrap();
        storage.close().unwrap();
    }

    let storage = Storage::open(&config(&dir)).unwrap();
    assert_eq!(get(&storage, "a"), Some(b"2".to_vec()));
    assert_eq!(get(&storage, "b"), None);
    assert_eq!(storage.last_segment_id(), 4);

    let recovery = storage.last_recovery().unwrap();
    assert_eq!(recovery.commands_recovered, 4);
    storage.close().unwrap();
}

#[test]
fn test_delete_missing_key_is_ok() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&config(&dir)).unwrap();

    assert_eq!(storage.execute(Command::delete("ghost")).unwrap(), None);
    // Still logged
    assert_eq!(storage.last_segment_id(), 1);
    storage.close().unwrap();
}

#[test]
fn test_invalid_commands_never_reach_the_log() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&config(&dir)).unwrap();

    assert!(matches!(
        storage.execute(Command::set("", "v")),
        Err(RelayError::InvalidCommand(_))
    ));
    assert!(matches!(
        storage.execute(Command::delete("")),
        Err(RelayError::InvalidCommand(_))
    ));
    assert_eq!(storage.last_segment_id(), 0);
    storage.close().unwrap();
}

#[test]
fn test_empty_value_is_stored_and_replayed() {
    let dir = TempDir::new().unwrap();

    {
        let storage = Storage::open(&config(&dir)).unwrap();
        set(&storage, "blank", "");
        assert_eq!(get(&storage, "blank"), Some(Vec::new()));
        storage.close().unwrap();
    }

    let storage = Storage::open(&config(&dir)).unwrap();
    assert_eq!(get(&storage, "blank"), Some(Vec::new()));
    assert_eq!(storage.last_segment_id(), 1);
    storage.close().unwrap();
}

#[test]
fn test_in_memory_mode() {
    let config = Config::builder().in_memory().build();
    let storage = Storage::open(&config).unwrap();

    assert!(storage.wal().is_none());
    set(&storage, "k", "v");
    assert_eq!(get(&storage, "k"), Some(b"v".to_vec()));
    assert_eq!(storage.last_segment_id(), 0);
    assert!(storage.last_recovery().is_none());
    storage.close().unwrap();
}

// =============================================================================
// Role Tests
// =============================================================================

#[test]
fn test_replica_rejects_client_writes() {
    let dir = TempDir::new().unwrap();
    let storage = storage_with_role(&dir, Role::Replica);
    assert!(storage.is_replica());

    assert!(matches!(
        storage.execute(Command::set("k", "v")),
        Err(RelayError::ReadOnly)
    ));
    assert!(matches!(
        storage.execute(Command::delete("k")),
        Err(RelayError::ReadOnly)
    ));

    // Neither the engine nor the log changed
    assert!(storage.engine().is_empty());
    assert_eq!(storage.last_segment_id(), 0);
    assert!(matches!(
        storage.execute(Command::get("k")),
        Err(RelayError::NotFound)
    ));
    storage.close().unwrap();
}

#[test]
fn test_replica_from_config() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .replica_of("127.0.0.1:1", Duration::from_secs(1))
        .build();
    let storage = Storage::open(&config).unwrap();

    assert_eq!(storage.role(), Role::Replica);
    storage.close().unwrap();
}

// =============================================================================
// Replicated Segment Tests
// =============================================================================

#[test]
fn test_apply_replicated_segments() {
    let dir = TempDir::new().unwrap();
    let storage = storage_with_role(&dir, Role::Replica);

    let first = Segment::new(1, vec![Command::set("a", "1"), Command::set("b", "2")]).unwrap();
    let second = Segment::new(2, vec![Command::delete("a")]).unwrap();
    storage.apply_replicated(first).unwrap();
    storage.apply_replicated(second).unwrap();

    assert_eq!(storage.last_segment_id(), 2);
    assert_eq!(get(&storage, "a"), None);
    assert_eq!(get(&storage, "b"), Some(b"2".to_vec()));
    storage.close().unwrap();

    // Replicated segments replay like local ones
    let reopened = storage_with_role(&dir, Role::Replica);
    reopened.restore().unwrap();
    assert_eq!(reopened.last_segment_id(), 2);
    assert_eq!(get(&reopened, "b"), Some(b"2".to_vec()));
    reopened.close().unwrap();
}

#[test]
fn test_apply_replicated_requires_wal() {
    let storage = Storage::new(Arc::new(Engine::new()), None, Role::Replica);
    let segment = Segment::new(1, vec![Command::set("a", "1")]).unwrap();

    assert!(matches!(
        storage.apply_replicated(segment),
        Err(RelayError::Config(_))
    ));
    assert!(storage.engine().is_empty());
}
