//! Engine Module
//!
//! The in-memory key/value map every node serves reads from.
//!
//! ## Responsibilities
//! - Hold the current value of every live key
//! - Execute GET/SET/DEL against that state
//! - Act as the WAL's `Applier`, so writes land in segment order
//!
//! Durability lives elsewhere: the engine is rebuilt on startup by replaying
//! the WAL into it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::error::{RelayError, Result};
use crate::protocol::Command;
use crate::wal::Applier;

/// Concurrent in-memory map
///
/// ## Concurrency Model: Multiple-Reader / Single-Writer
/// - `get` takes the read lock; any number run in parallel
/// - `set` / `delete` take the write lock briefly
///
/// Ordering between writers is decided by the caller (the WAL collector
/// applies one segment at a time), not by the engine.
pub struct Engine {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Approximate bytes of keys and values held
    size: AtomicUsize,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the value for `key`, or `NotFound`
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.data.read().get(key).cloned().ok_or(RelayError::NotFound)
    }

    /// Insert or replace a value
    ///
    /// The size counter moves while the write lock is held, so it never
    /// sees a removal before the matching insert.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len();
        let value_len = value.len();

        let mut data = self.data.write();
        match data.insert(key, value) {
            // Same key, so only the value size changes
            Some(previous) if previous.len() > value_len => {
                self.size.fetch_sub(previous.len() - value_len, Ordering::Relaxed);
            }
            Some(previous) => {
                self.size.fetch_add(value_len - previous.len(), Ordering::Relaxed);
            }
            None => {
                self.size.fetch_add(key_len + value_len, Ordering::Relaxed);
            }
        }
    }

    /// Remove a key; deleting an absent key is not an error
    pub fn delete(&self, key: &[u8]) {
        let mut data = self.data.write();
        if let Some(previous) = data.remove(key) {
            self.size.fetch_sub(key.len() + previous.len(), Ordering::Relaxed);
        }
    }

    /// Execute a command directly against the map
    ///
    /// GET returns the value; writes return `None`.
    pub fn execute(&self, command: &Command) -> Result<Option<Vec<u8>>> {
        match command {
            Command::Get { key } => self.get(key).map(Some),
            Command::Set { key, value } => {
                self.set(key.clone(), value.clone());
                Ok(None)
            }
            Command::Delete { key } => {
                self.delete(key);
                Ok(None)
            }
        }
    }

    /// Replay commands in order, stopping at the first failure
    pub fn replay<'a, I>(&self, commands: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Command>,
    {
        let mut applied = 0;
        for command in commands {
            self.apply(command)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Copy of every key/value pair in key order
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop every key
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Applier for Engine {
    /// Apply a persisted write; GET never reaches the log
    fn apply(&self, command: &Command) -> Result<()> {
        match command {
            Command::Get { .. } => Err(RelayError::InvalidCommand(
                "cannot apply a read".into(),
            )),
            _ => self.execute(command).map(|_| ()),
        }
    }
}
