//! Storage Module
//!
//! The facade every client command goes through.
//!
//! ## Responsibilities
//! - Validate commands at the edge, before they reach the WAL
//! - Route reads to the engine and writes through the WAL
//! - Refuse writes on a replica
//! - Replay the WAL into the engine on startup
//! - Accept replicated segments (persist, then apply)
//!
//! ## Write Path
//! ```text
//! execute(SET) ──► Wal::save ──► collector: segment write ──► Engine::apply
//!                     ▲                                            │
//!                     └──────────── per-command result ◄───────────┘
//! ```

use std::fs;
use std::sync::Arc;

use crate::concurrent::Shutdown;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{RelayError, Result};
use crate::protocol::Command;
use crate::wal::{Applier, RecoveryResult, Segment, SegmentId, Wal};

/// Which writes this node accepts; fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts client writes
    Primary,

    /// Read-only for clients; segments arrive from the primary
    Replica,
}

/// Engine + WAL + role
pub struct Storage {
    engine: Arc<Engine>,

    /// `None` when running purely in memory
    wal: Option<Arc<Wal>>,

    role: Role,
}

impl Storage {
    /// Open storage for `config` and replay the WAL into the engine
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Open the WAL (recovers the segment index)
    /// 3. Replay every recovered command into a fresh engine
    pub fn open(config: &Config) -> Result<Self> {
        let role = if config.is_replica() {
            Role::Replica
        } else {
            Role::Primary
        };

        let engine = Arc::new(Engine::new());
        let wal = match &config.wal {
            Some(wal_config) => {
                fs::create_dir_all(&config.data_dir)?;
                let applier: Arc<dyn Applier> = engine.clone();
                Some(Arc::new(Wal::open(&config.wal_dir(), wal_config, applier)?))
            }
            None => None,
        };

        let storage = Self { engine, wal, role };
        storage.restore()?;
        Ok(storage)
    }

    /// Wrap already-built parts; nothing is replayed
    pub fn new(engine: Arc<Engine>, wal: Option<Arc<Wal>>, role: Role) -> Self {
        Self { engine, wal, role }
    }

    /// Replay persisted commands into the engine
    ///
    /// Returns the number of commands applied.
    pub fn restore(&self) -> Result<usize> {
        let wal = match &self.wal {
            Some(wal) => wal,
            None => return Ok(0),
        };

        let commands = wal.load()?;
        let applied = self.engine.replay(&commands)?;

        tracing::info!(
            commands = applied,
            keys = self.engine.len(),
            last_segment_id = wal.last_segment_id(),
            "storage restored"
        );
        Ok(applied)
    }

    /// Execute one client command
    ///
    /// Returns the value for GET and `None` for writes.
    pub fn execute(&self, command: Command) -> Result<Option<Vec<u8>>> {
        self.admit(&command)?;
        match (&self.wal, command.is_write()) {
            (_, false) => self.engine.execute(&command),
            // The collector applies the write once its segment is on disk
            (Some(wal), true) => wal.save(command).map(|_| None),
            (None, true) => self.engine.execute(&command),
        }
    }

    /// Like `execute`, but a write gives up with `Cancelled` once
    /// `shutdown` fires
    pub fn execute_until(&self, command: Command, shutdown: &Shutdown) -> Result<Option<Vec<u8>>> {
        self.admit(&command)?;
        match (&self.wal, command.is_write()) {
            (Some(wal), true) => wal.save_until(command, shutdown).map(|_| None),
            _ => self.execute(command),
        }
    }

    /// Persist a segment shipped from the primary, then apply it
    ///
    /// The segment keeps its own id; nothing new is assigned.
    pub fn apply_replicated(&self, segment: Segment) -> Result<()> {
        let wal = self.wal.as_ref().ok_or_else(|| {
            RelayError::Config("replication requires the write-ahead log".into())
        })?;

        let id = segment.id();
        let commands = segment.commands().to_vec();
        wal.save_segment(segment)?;

        for command in &commands {
            self.engine.apply(command).map_err(|e| {
                tracing::warn!(segment_id = id, error = %e, "apply of replicated command failed");
                e
            })?;
        }
        Ok(())
    }

    /// Flush any partial batch and close the WAL
    pub fn close(&self) -> Result<()> {
        match &self.wal {
            Some(wal) => wal.close(),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn wal(&self) -> Option<&Arc<Wal>> {
        self.wal.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_replica(&self) -> bool {
        self.role == Role::Replica
    }

    /// Highest segment id held locally (0 without a WAL)
    pub fn last_segment_id(&self) -> SegmentId {
        self.wal.as_ref().map_or(0, |wal| wal.last_segment_id())
    }

    pub fn last_recovery(&self) -> Option<RecoveryResult> {
        self.wal.as_ref().map(|wal| wal.last_recovery())
    }

    /// Edge checks: read-only role, then field validation
    fn admit(&self, command: &Command) -> Result<()> {
        if command.is_write() && self.role == Role::Replica {
            return Err(RelayError::ReadOnly);
        }
        command.validate()
    }
}
