//! WAL Recovery
//!
//! Rebuilds the segment list from the file store on startup.

use crate::config::RecoveryMode;
use crate::error::{DecodeError, RelayError, Result};
use super::{FileStore, Segment, SegmentId, SegmentReader};

/// Handles WAL recovery after restart or crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of segments successfully recovered
    pub segments_recovered: u64,

    /// Number of commands across those segments
    pub commands_recovered: u64,

    /// Highest segment id seen (0 for an empty log)
    pub last_segment_id: SegmentId,

    /// Bytes of a torn final segment cut from the last file
    pub truncated_bytes: u64,
}

impl RecoveryResult {
    /// Whether a partial write was removed
    pub fn was_truncated(&self) -> bool {
        self.truncated_bytes > 0
    }
}

impl WalRecovery {
    /// Recover every segment in on-disk order
    ///
    /// This will:
    /// 1. Read all bytes from the store
    /// 2. Decode segments until the input ends
    /// 3. On a truncated final segment, either fail (`Strict`) or cut the
    ///    partial bytes from the last file (`TruncateTornTail`)
    /// 4. Fail on any other decode error
    pub fn recover(store: &FileStore, mode: RecoveryMode) -> Result<(Vec<Segment>, RecoveryResult)> {
        let data = store.read_all()?;
        let mut reader = SegmentReader::new(&data);
        let mut segments = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_segment() {
                Ok(Some(segment)) => {
                    if segment.id() <= result.last_segment_id {
                        tracing::warn!(
                            segment_id = segment.id(),
                            previous = result.last_segment_id,
                            "WAL segment ids out of order"
                        );
                    }
                    result.segments_recovered += 1;
                    result.commands_recovered += segment.len() as u64;
                    result.last_segment_id = result.last_segment_id.max(segment.id());
                    segments.push(segment);
                }
                Ok(None) => break,
                Err(RelayError::Decode(DecodeError::Truncated { context }))
                    if mode == RecoveryMode::TruncateTornTail =>
                {
                    let torn = reader.remaining() as u64;
                    tracing::warn!(
                        bytes = torn,
                        context,
                        offset = reader.position(),
                        "cutting torn segment from end of WAL"
                    );
                    store.truncate_tail(torn)?;
                    result.truncated_bytes = torn;
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        offset = reader.position(),
                        "WAL replay failed"
                    );
                    return Err(e);
                }
            }
        }

        Ok((segments, result))
    }

    /// Verify the log decodes cleanly without modifying anything
    pub fn verify(store: &FileStore) -> Result<RecoveryResult> {
        let data = store.read_all()?;
        let mut result = RecoveryResult::default();
        for segment in SegmentReader::new(&data).segments() {
            let segment = segment?;
            result.segments_recovered += 1;
            result.commands_recovered += segment.len() as u64;
            result.last_segment_id = result.last_segment_id.max(segment.id());
        }
        Ok(result)
    }
}
