//! Tests for the batching WAL
//!
//! These tests verify:
//! - Segment ids are 1..N with no gaps
//! - Many concurrent writers all persist and replay
//! - Live engine state equals replayed state
//! - Close flushes a partially filled batch
//! - A failed segment write fails every command in its batch
//! - Replicated segments keep their own ids
//! - GET and invalid commands never reach a batch

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaykv::concurrent::Shutdown;
use relaykv::config::{RecoveryMode, WalConfig, WalSyncStrategy};
use relaykv::engine::Engine;
use relaykv::protocol::Command;
use relaykv::wal::{Segment, Wal};
use relaykv::RelayError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn wal_config(batch_size: usize, batch_timeout: Duration) -> WalConfig {
    WalConfig {
        batch_size,
        batch_timeout,
        max_segment_size: 10 * 1024 * 1024,
        sync_strategy: WalSyncStrategy::EveryWrite,
        max_in_flight: None,
        recovery_mode: RecoveryMode::Strict,
    }
}

fn open(dir: &TempDir, config: &WalConfig) -> (Arc<Engine>, Arc<Wal>) {
    let engine = Arc::new(Engine::new());
    let wal = Wal::open(dir.path(), config, engine.clone()).unwrap();
    (engine, Arc::new(wal))
}

/// Reopen the directory and replay into a fresh engine
fn reload(dir: &TempDir, config: &WalConfig) -> (Arc<Engine>, Arc<Wal>, Vec<Command>) {
    let (engine, wal) = open(dir, config);
    let commands = wal.load().unwrap();
    engine.replay(&commands).unwrap();
    (engine, wal, commands)
}

// =============================================================================
// Segment Id Tests
// =============================================================================

#[test]
fn test_sequential_saves_get_ids_one_to_n() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1, Duration::from_millis(5));
    let (_engine, wal) = open(&dir, &config);

    for i in 0..20 {
        wal.save(Command::set(format!("k{}", i), "v")).unwrap();
    }

    assert_eq!(wal.last_segment_id(), 20);
    let ids: Vec<i64> = wal.segments_after(0).iter().map(|s| s.id()).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    wal.close().unwrap();
}

#[test]
fn test_ids_continue_after_reopen() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1, Duration::from_millis(5));

    let (_engine, wal) = open(&dir, &config);
    for i in 0..3 {
        wal.save(Command::set(format!("k{}", i), "v")).unwrap();
    }
    wal.close().unwrap();

    let (_engine, wal, commands) = reload(&dir, &config);
    assert_eq!(commands.len(), 3);
    assert_eq!(wal.last_segment_id(), 3);
    assert_eq!(wal.last_recovery().segments_recovered, 3);

    wal.save(Command::delete("k0")).unwrap();
    assert_eq!(wal.last_segment_id(), 4);
    wal.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_many_concurrent_writers_persist_everything() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(100, Duration::from_millis(5));
    let (engine, wal) = open(&dir, &config);

    let handles: Vec<_> = (0..1000)
        .map(|i| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || wal.save(Command::set(format!("key{}", i), format!("value{}", i))))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Every save was applied by the collector before it returned
    assert_eq!(engine.len(), 1000);
    let segments = wal.segment_count();
    assert!(segments >= 10, "expected at least 10 segments, got {}", segments);
    assert_eq!(wal.last_segment_id(), segments as i64);
    wal.close().unwrap();

    let (reloaded, _wal, commands) = reload(&dir, &config);
    assert_eq!(commands.len(), 1000);
    let mut keys: Vec<Vec<u8>> = commands.iter().map(|c| c.key().to_vec()).collect();
    keys.sort();
    let mut expected: Vec<Vec<u8>> = (0..1000).map(|i| format!("key{}", i).into_bytes()).collect();
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(reloaded.snapshot(), engine.snapshot());
}

#[test]
fn test_live_state_matches_replay_for_contended_key() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(8, Duration::from_millis(2));
    let (engine, wal) = open(&dir, &config);

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || wal.save(Command::set("contended", format!("{}", i))))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    wal.close().unwrap();

    let (reloaded, _wal, _) = reload(&dir, &config);
    assert_eq!(reloaded.get(b"contended").unwrap(), engine.get(b"contended").unwrap());
}

#[test]
fn test_in_flight_gate_still_completes_all() {
    let dir = TempDir::new().unwrap();
    let mut config = wal_config(4, Duration::from_millis(2));
    config.max_in_flight = Some(2);
    let (engine, wal) = open(&dir, &config);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || wal.save(Command::set(format!("k{}", i), "v")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(engine.len(), 20);
    // With at most two in flight, no segment holds more than two commands
    assert!(wal.segments_after(0).iter().all(|s| s.len() <= 2));
    wal.close().unwrap();
}

// =============================================================================
// Close / Cancellation Tests
// =============================================================================

#[test]
fn test_close_flushes_partial_batch() {
    let dir = TempDir::new().unwrap();
    // Neither the size nor the timeout will close this batch
    let config = wal_config(1000, Duration::from_secs(30));
    let (_engine, wal) = open(&dir, &config);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || wal.save(Command::set(format!("k{}", i), "v")))
        })
        .collect();

    thread::sleep(Duration::from_millis(200));
    wal.close().unwrap();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let (engine, wal, commands) = reload(&dir, &config);
    assert_eq!(commands.len(), 5);
    assert_eq!(engine.len(), 5);
    assert_eq!(wal.segment_count(), 1);
}

#[test]
fn test_save_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(10, Duration::from_millis(5));
    let (_engine, wal) = open(&dir, &config);
    wal.close().unwrap();

    assert!(matches!(
        wal.save(Command::set("k", "v")),
        Err(RelayError::Closed)
    ));
}

#[test]
fn test_disk_failure_fails_whole_batch() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(3, Duration::from_secs(5));
    let (engine, wal) = open(&dir, &config);

    // Every segment write from here on fails
    wal.store().close().unwrap();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || wal.save(Command::set(format!("k{}", i), "v")))
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert!(
            matches!(result, Err(RelayError::Persistence(_))),
            "got {:?}",
            result
        );
    }

    // Applied in memory, but the failed segment never took an id
    assert_eq!(engine.len(), 3);
    assert_eq!(wal.last_segment_id(), 0);
    assert_eq!(wal.segment_count(), 0);
}

#[test]
fn test_save_until_cancelled_by_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1000, Duration::from_secs(30));
    let (_engine, wal) = open(&dir, &config);

    let shutdown = Shutdown::new();
    shutdown.trigger();
    assert!(matches!(
        wal.save_until(Command::set("k", "v"), &shutdown),
        Err(RelayError::Cancelled)
    ));

    // The abandoned command is still flushed; nobody is resolved twice
    wal.close().unwrap();
    let (engine, _wal, _) = reload(&dir, &config);
    assert_eq!(engine.get(b"k").unwrap(), b"v");
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_get_is_never_persisted() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1, Duration::from_millis(5));
    let (_engine, wal) = open(&dir, &config);

    assert!(matches!(
        wal.save(Command::get("k")),
        Err(RelayError::InvalidCommand(_))
    ));
    assert!(matches!(
        wal.save(Command::set("", "v")),
        Err(RelayError::InvalidCommand(_))
    ));
    assert_eq!(wal.segment_count(), 0);
    wal.close().unwrap();
}

// =============================================================================
// Replicated Segment Tests
// =============================================================================

#[test]
fn test_save_segment_keeps_ids() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(100, Duration::from_millis(100));
    let (_engine, wal) = open(&dir, &config);

    for id in 1..=100 {
        wal.save_segment(Segment::new(id, Vec::new()).unwrap()).unwrap();
    }

    assert_eq!(wal.last_segment_id(), 100);
    for after in 0..100 {
        assert_eq!(wal.segments_after(after).len(), (100 - after) as usize);
    }
    wal.close().unwrap();

    let (_engine, wal, _) = reload(&dir, &config);
    assert_eq!(wal.last_segment_id(), 100);
}

#[test]
fn test_local_flush_follows_replicated_ids() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1, Duration::from_millis(5));
    let (_engine, wal) = open(&dir, &config);

    wal.save_segment(Segment::new(7, vec![Command::set("a", "1")]).unwrap())
        .unwrap();
    wal.save(Command::set("b", "2")).unwrap();

    assert_eq!(wal.last_segment_id(), 8);
    let segment = wal.segment(8).unwrap();
    assert_eq!(segment.commands(), &[Command::set("b", "2")]);
    wal.close().unwrap();
}

#[test]
fn test_load_twice_rereads_disk() {
    let dir = TempDir::new().unwrap();
    let config = wal_config(1, Duration::from_millis(5));
    let (_engine, wal) = open(&dir, &config);

    assert!(wal.load().unwrap().is_empty());
    wal.save(Command::set("a", "1")).unwrap();
    wal.save(Command::set("a", "2")).unwrap();

    let commands = wal.load().unwrap();
    let mut last = HashMap::new();
    for command in &commands {
        if let Command::Set { key, value } = command {
            last.insert(key.clone(), value.clone());
        }
    }
    assert_eq!(last.get(b"a".as_slice()), Some(&b"2".to_vec()));
    assert_eq!(wal.last_segment_id(), 2);
    wal.close().unwrap();
}
