//! WAL Reader
//!
//! Walks encoded segments in a byte buffer, tracking how far the valid
//! prefix reaches.

use crate::error::Result;
use crate::protocol::decode_segment;
use super::Segment;

/// Reads segments one at a time from persisted bytes
pub struct SegmentReader<'a> {
    data: &'a [u8],
    /// Offset just past the last fully decoded segment
    position: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read the next segment
    ///
    /// `Ok(None)` at a clean end of input. On error the position stays at
    /// the start of the failing segment.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        let mut remaining = &self.data[self.position..];
        let segment = decode_segment(&mut remaining)?;
        self.position = self.data.len() - remaining.len();
        Ok(segment)
    }

    /// Bytes consumed by fully decoded segments
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes not yet decoded
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Iterate over all valid segments
    pub fn segments(self) -> SegmentIter<'a> {
        SegmentIter {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over decoded segments; stops after the first error
pub struct SegmentIter<'a> {
    reader: SegmentReader<'a>,
    done: bool,
}

impl Iterator for SegmentIter<'_> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_segment() {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
