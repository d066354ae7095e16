//! Batching write-ahead log
//!
//! Turns many concurrent single-command saves into few, durable segment
//! writes, and rebuilds its segment index from disk on open.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::concurrent::{Batcher, Semaphore, Shutdown};
use crate::config::{RecoveryMode, WalConfig};
use crate::error::{RelayError, Result};
use crate::protocol::{segment_to_bytes, Command};
use super::{FileStore, RecoveryResult, Segment, SegmentId, SegmentIndex, WalRecovery};

/// Receives each command of a flushed batch, in segment order
///
/// The WAL calls this from its collector thread right after the segment
/// write, so live state is built in exactly the order replay will use.
pub trait Applier: Send + Sync {
    fn apply(&self, command: &Command) -> Result<()>;
}

/// The write-ahead log
///
/// ## Concurrency Model
/// - `save`: any number of callers; each blocks until its batch is flushed
/// - One collector thread assigns ids, writes segments and applies commands
/// - `flush_lock` serializes local flushes with `save_segment`, so an id is
///   never handed out twice
/// - `index` is read by replication (`segments_after`) under a shared lock
pub struct Wal {
    store: Arc<FileStore>,
    index: Arc<RwLock<SegmentIndex>>,
    flush_lock: Arc<Mutex<()>>,
    batcher: Batcher<Command, Result<()>>,

    /// Optional bound on commands in flight into the batcher
    gate: Option<Semaphore>,

    recovery_mode: RecoveryMode,

    /// Commands recovered at open, handed out by the first `load`
    recovered: Mutex<Option<Vec<Command>>>,
    last_recovery: Mutex<RecoveryResult>,
}

/// Shared state the collector thread needs to flush a batch
#[derive(Clone)]
struct SegmentWriter {
    store: Arc<FileStore>,
    index: Arc<RwLock<SegmentIndex>>,
    flush_lock: Arc<Mutex<()>>,
}

impl Wal {
    /// Open the log in `dir`, recover existing segments and start the collector
    ///
    /// Recovery runs before the collector accepts anything, so new segment
    /// ids always continue after the highest one on disk.
    pub fn open(dir: &Path, config: &WalConfig, applier: Arc<dyn Applier>) -> Result<Self> {
        let store = Arc::new(FileStore::open(
            dir,
            config.max_segment_size,
            config.sync_strategy,
        )?);
        let index = Arc::new(RwLock::new(SegmentIndex::new()));
        let flush_lock = Arc::new(Mutex::new(()));

        let writer = SegmentWriter {
            store: Arc::clone(&store),
            index: Arc::clone(&index),
            flush_lock: Arc::clone(&flush_lock),
        };
        let (commands, result) = writer.recover(config.recovery_mode)?;

        let batcher = Batcher::spawn(
            "relaykv-wal",
            config.batch_size,
            config.batch_timeout,
            move |commands| writer.flush_batch(commands, applier.as_ref()),
        )?;

        Ok(Self {
            store,
            index,
            flush_lock,
            batcher,
            gate: config.max_in_flight.map(Semaphore::new),
            recovery_mode: config.recovery_mode,
            recovered: Mutex::new(Some(commands)),
            last_recovery: Mutex::new(result),
        })
    }

    /// Save one write command; blocks until its batch is on disk
    ///
    /// Returns the batch-wide disk outcome combined with this command's
    /// apply outcome.
    pub fn save(&self, command: Command) -> Result<()> {
        check_persistable(&command)?;
        let _permit = self.gate.as_ref().map(Semaphore::acquire);
        self.batcher.submit(command)?.wait()?
    }

    /// Like `save`, but gives up with `Cancelled` once `shutdown` fires
    ///
    /// A cancelled command may still be flushed later; its result is dropped.
    pub fn save_until(&self, command: Command, shutdown: &Shutdown) -> Result<()> {
        check_persistable(&command)?;
        let _permit = match &self.gate {
            Some(gate) => Some(gate.acquire_until(shutdown)?),
            None => None,
        };
        self.batcher.submit(command)?.wait_until(shutdown)?
    }

    /// All persisted commands in on-disk order, for replay into the engine
    ///
    /// The first call returns what `open` recovered; later calls re-read the
    /// files and rebuild the index.
    pub fn load(&self) -> Result<Vec<Command>> {
        if let Some(commands) = self.recovered.lock().take() {
            return Ok(commands);
        }

        let writer = self.writer();
        let (commands, result) = writer.recover(self.recovery_mode)?;
        *self.last_recovery.lock() = result;
        Ok(commands)
    }

    /// Persist a segment received from the primary under its own id
    pub fn save_segment(&self, segment: Segment) -> Result<()> {
        self.writer().save_segment(segment)
    }

    /// Every segment with an id strictly greater than `id`, ascending
    pub fn segments_after(&self, id: SegmentId) -> Vec<Arc<Segment>> {
        self.index.read().after(id)
    }

    /// High-water mark of the index (0 when empty)
    pub fn last_segment_id(&self) -> SegmentId {
        self.index.read().max_id()
    }

    pub fn segment(&self, id: SegmentId) -> Option<Arc<Segment>> {
        self.index.read().get(id)
    }

    pub fn segment_count(&self) -> usize {
        self.index.read().len()
    }

    /// Statistics from the most recent recovery
    pub fn last_recovery(&self) -> RecoveryResult {
        self.last_recovery.lock().clone()
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Flush any open batch, stop the collector and close the files
    pub fn close(&self) -> Result<()> {
        self.batcher.close();
        self.store.close()
    }

    fn writer(&self) -> SegmentWriter {
        SegmentWriter {
            store: Arc::clone(&self.store),
            index: Arc::clone(&self.index),
            flush_lock: Arc::clone(&self.flush_lock),
        }
    }
}

impl SegmentWriter {
    /// Write one batch as the next segment and apply its commands
    fn flush_batch(&self, commands: Vec<Command>, applier: &dyn Applier) -> Vec<Result<()>> {
        let _flush = self.flush_lock.lock();

        let id = self.index.read().next_id();
        let segment = Segment::from_parts(id, commands);

        let disk_error = self.persist(&segment).err().map(|e| e.to_string());
        match &disk_error {
            None => tracing::debug!(
                segment_id = id,
                commands = segment.len(),
                "flushed WAL segment"
            ),
            Some(error) => tracing::error!(
                segment_id = id,
                commands = segment.len(),
                error = %error,
                "WAL segment write failed"
            ),
        }

        let results = segment
            .commands()
            .iter()
            .map(|command| RelayError::aggregate(disk_error.as_deref(), applier.apply(command)))
            .collect();

        // A failed write does not consume its id
        if disk_error.is_none() {
            self.index.write().insert(segment);
        }
        results
    }

    fn save_segment(&self, segment: Segment) -> Result<()> {
        let _flush = self.flush_lock.lock();
        self.persist(&segment)?;

        tracing::debug!(
            segment_id = segment.id(),
            commands = segment.len(),
            "stored replicated segment"
        );
        self.index.write().insert(segment);
        Ok(())
    }

    fn persist(&self, segment: &Segment) -> Result<()> {
        let bytes = segment_to_bytes(segment)?;
        self.store.write(&bytes)?;
        Ok(())
    }

    /// Rebuild the index from disk and return the flattened commands
    fn recover(&self, mode: RecoveryMode) -> Result<(Vec<Command>, RecoveryResult)> {
        let _flush = self.flush_lock.lock();
        let (segments, result) = WalRecovery::recover(&self.store, mode)?;

        let mut index = self.index.write();
        index.clear();
        let mut commands = Vec::with_capacity(result.commands_recovered as usize);
        for segment in segments {
            commands.extend(segment.commands().iter().cloned());
            index.insert(segment);
        }

        if result.segments_recovered > 0 || result.was_truncated() {
            tracing::info!(
                segments = result.segments_recovered,
                commands = result.commands_recovered,
                last_segment_id = result.last_segment_id,
                truncated_bytes = result.truncated_bytes,
                "WAL recovered"
            );
        }
        Ok((commands, result))
    }
}

/// Only encodable writes may enter a batch; one bad command must not
/// fail the disk write for everyone else in it
fn check_persistable(command: &Command) -> Result<()> {
    if !command.is_write() {
        return Err(RelayError::InvalidCommand(
            "GET is read-only and never persisted".into(),
        ));
    }
    command.validate()
}
