//! WAL Segment definitions
//!
//! A segment is one flushed batch: the unit of persistence and replication.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::protocol::codec::{encoded_command_len, SEGMENT_HEADER_SIZE};
use crate::protocol::Command;

/// Segment identifier; the first segment is 1
pub type SegmentId = i64;

/// An immutable, ordered batch of write commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: SegmentId,
    commands: Vec<Command>,
}

impl Segment {
    /// Create a segment, checking the id and that every command is a write
    pub fn new(id: SegmentId, commands: Vec<Command>) -> Result<Self> {
        if id < 1 {
            return Err(RelayError::InvalidCommand(format!(
                "segment id must be >= 1, got {}",
                id
            )));
        }
        if commands.iter().any(|c| !c.is_write()) {
            return Err(RelayError::InvalidCommand(
                "segments only hold SET and DEL commands".into(),
            ));
        }
        Ok(Self { id, commands })
    }

    /// Assemble a segment the decoder has already validated
    pub(crate) fn from_parts(id: SegmentId, commands: Vec<Command>) -> Self {
        Self { id, commands }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Commands in admission order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Exact size of this segment once encoded
    pub fn encoded_len(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.commands.iter().map(encoded_command_len).sum::<usize>()
    }
}

/// In-memory index of every segment a WAL holds
///
/// Keyed by id, so range queries come back in ascending order.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    segments: BTreeMap<SegmentId, Arc<Segment>>,
    max_id: SegmentId,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment and raise the high-water mark if needed
    pub fn insert(&mut self, segment: Segment) {
        let id = segment.id();
        self.segments.insert(id, Arc::new(segment));
        if id > self.max_id {
            self.max_id = id;
        }
    }

    /// Highest id ever inserted (0 when empty)
    pub fn max_id(&self) -> SegmentId {
        self.max_id
    }

    /// The id the next local flush must use
    pub fn next_id(&self) -> SegmentId {
        self.max_id + 1
    }

    pub fn get(&self, id: SegmentId) -> Option<Arc<Segment>> {
        self.segments.get(&id).cloned()
    }

    /// Every segment with an id strictly greater than `id`, ascending
    pub fn after(&self, id: SegmentId) -> Vec<Arc<Segment>> {
        if id == SegmentId::MAX {
            return Vec::new();
        }
        self.segments
            .range(id + 1..)
            .map(|(_, segment)| Arc::clone(segment))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.max_id = 0;
    }
}
