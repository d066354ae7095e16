//! WAL File Store
//!
//! Append-only persistence of encoded segment bytes across size-rotated
//! files.
//!
//! ## Responsibilities
//! - Discover existing WAL files on startup and resume the newest one
//! - Append whole writes, rotating before a write would overflow a file
//! - Read every file back in creation order
//!
//! Files are named `wal_0000000001.bin`, `wal_0000000002.bin`, ... and ordered by the
//! parsed sequence number, so a directory listing never needs extra metadata.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::WalSyncStrategy;
use crate::error::{RelayError, Result};

const FILE_PREFIX: &str = "wal_";
const FILE_EXTENSION: &str = "bin";

/// Size-rotated, append-only file persistence
///
/// ## Concurrency:
/// - The open handle, its byte count and the rotation counter sit behind
///   one mutex; `write` holds it for the whole append + sync.
pub struct FileStore {
    /// Directory holding the WAL files
    dir: PathBuf,

    /// Rotation threshold in bytes
    max_file_size: u64,

    /// Whether each write is fsynced
    sync_strategy: WalSyncStrategy,

    inner: Mutex<StoreInner>,
}

struct StoreInner {
    /// Currently open file (opened lazily on first write)
    file: Option<File>,

    /// Sequence number of `file`, 0 before the first file exists
    sequence: u32,

    /// Bytes in `file`
    written: u64,

    closed: bool,
}

impl FileStore {
    /// Open or create a store in `dir`
    ///
    /// If WAL files already exist the newest is reopened in append mode and
    /// its size becomes the running byte count. Nothing is truncated.
    pub fn open(dir: &Path, max_file_size: u64, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let files = discover(dir)?;
        let mut inner = StoreInner {
            file: None,
            sequence: 0,
            written: 0,
            closed: false,
        };

        if let Some((last, path)) = files.last() {
            let file = OpenOptions::new().append(true).open(path)?;
            inner.written = file.metadata()?.len();
            inner.file = Some(file);
            inner.sequence = *last;

            tracing::debug!(
                file = %path.display(),
                bytes = inner.written,
                files = files.len(),
                "resuming WAL file"
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            max_file_size,
            sync_strategy,
            inner: Mutex::new(inner),
        })
    }

    /// Append `bytes` as one unit and return the count written
    ///
    /// Rotates first when the current file is non-empty and the write would
    /// push it past `max_file_size`, so one write never spans two files.
    /// A failed write is rolled back to the previous file length.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RelayError::Closed);
        }

        let len = bytes.len() as u64;
        let rotate = match inner.file {
            None => true,
            Some(_) => inner.written > 0 && inner.written + len > self.max_file_size,
        };
        if rotate {
            self.rotate(&mut inner)?;
        }

        let written = inner.written;
        let sync = self.sync_strategy == WalSyncStrategy::EveryWrite;
        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| RelayError::Persistence("no open WAL file".into()))?;

        let result = file
            .write_all(bytes)
            .and_then(|_| if sync { file.sync_data() } else { Ok(()) });

        if let Err(e) = result {
            // Leave no torn bytes behind for the next append to bury
            if let Err(rollback) = file.set_len(written) {
                tracing::error!(error = %rollback, "failed to roll back partial WAL write");
            }
            return Err(RelayError::Persistence(format!("write WAL file: {}", e)));
        }

        inner.written += len;
        Ok(bytes.len())
    }

    /// Every persisted byte, files concatenated in creation order
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let _guard = self.inner.lock();

        let mut data = Vec::new();
        for (_, path) in discover(&self.dir)? {
            let mut file = File::open(&path)?;
            let before = data.len();
            file.read_to_end(&mut data)?;
            tracing::debug!(
                file = %path.display(),
                bytes = data.len() - before,
                "read WAL file"
            );
        }
        Ok(data)
    }

    /// Drop the last `bytes` bytes of the newest file
    ///
    /// Used by recovery to cut a torn final segment. Fails if the newest
    /// file is shorter than `bytes`.
    pub fn truncate_tail(&self, bytes: u64) -> Result<()> {
        let mut inner = self.inner.lock();

        let (last, path) = discover(&self.dir)?
            .pop()
            .ok_or_else(|| RelayError::Persistence("no WAL file to truncate".into()))?;

        let file = OpenOptions::new().write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len < bytes {
            return Err(RelayError::Persistence(format!(
                "cannot cut {} bytes from {} ({} bytes long)",
                bytes,
                path.display(),
                len
            )));
        }
        file.set_len(len - bytes)?;
        file.sync_all()?;

        if inner.sequence == last {
            inner.written = len - bytes;
        }
        Ok(())
    }

    /// Paths of all WAL files in creation order
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        Ok(discover(&self.dir)?.into_iter().map(|(_, path)| path).collect())
    }

    /// Bytes in the currently open file
    pub fn current_file_size(&self) -> u64 {
        self.inner.lock().written
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sync and release the open file; later writes fail with `Closed`
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        if let Some(file) = inner.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Start the next numbered file (called with the lock held)
    fn rotate(&self, inner: &mut StoreInner) -> Result<()> {
        let sequence = inner.sequence + 1;
        let path = file_path(&self.dir, sequence);

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                RelayError::Persistence(format!("create {}: {}", path.display(), e))
            })?;

        if let Some(old) = inner.file.replace(file) {
            if let Err(e) = old.sync_all() {
                tracing::warn!(error = %e, "sync of rotated WAL file failed");
            }
        }
        inner.sequence = sequence;
        inner.written = 0;

        tracing::debug!(file = %path.display(), "rotated to new WAL file");
        Ok(())
    }
}

/// Generate the path for the file with the given sequence number
fn file_path(dir: &Path, sequence: u32) -> PathBuf {
    dir.join(format!("{}{:010}.{}", FILE_PREFIX, sequence, FILE_EXTENSION))
}

/// Parse a sequence number from a file name
/// "wal_0000000042.bin" → Some(42); narrower legacy widths parse too
fn parse_sequence(path: &Path) -> Option<u32> {
    if path.extension()? != FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(FILE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Every WAL file in `dir` with its sequence number, ascending by number
///
/// Paths are kept as found, so files written with a narrower pad still open.
fn discover(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(sequence) = parse_sequence(&path) {
                files.push((sequence, path));
            }
        }
    }
    files.sort_unstable_by_key(|(sequence, _)| *sequence);
    Ok(files)
}
