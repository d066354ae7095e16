//! Replica-side sync client
//!
//! Polls the primary on a fixed interval with its own last segment id and
//! persists, then applies, whatever comes back.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::concurrent::Shutdown;
use crate::error::{RelayError, Result};
use crate::protocol::codec::{read_sync_response, write_sync_request};
use crate::storage::Storage;
use crate::wal::SegmentId;

/// Outcome of one successful sync round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Segments the primary sent
    pub received: usize,

    /// Segments persisted and applied
    pub applied: usize,

    /// Already-held segments that were skipped
    pub skipped: usize,

    /// Local last segment id after the round
    pub last_segment_id: SegmentId,
}

/// Open connection to the primary
struct Link {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Keeps a replica's storage converging on its primary
pub struct ReplicaClient {
    primary_addr: String,
    storage: Arc<Storage>,
    io_timeout: Duration,

    /// Reused across rounds; dropped on any error
    link: Option<Link>,
}

impl ReplicaClient {
    pub fn new(primary_addr: impl Into<String>, storage: Arc<Storage>, io_timeout: Duration) -> Self {
        Self {
            primary_addr: primary_addr.into(),
            storage,
            io_timeout,
            link: None,
        }
    }

    /// Sync every `interval` until `shutdown` fires (blocking)
    ///
    /// A failed round is logged and retried on the next tick over a fresh
    /// connection.
    pub fn run(&mut self, interval: Duration, shutdown: &Shutdown) {
        tracing::info!(
            primary = %self.primary_addr,
            interval_ms = interval.as_millis() as u64,
            "replica sync started"
        );

        while !shutdown.wait_timeout(interval) {
            if let Err(e) = self.sync_once() {
                tracing::warn!(primary = %self.primary_addr, error = %e, "sync round failed");
            }
        }

        tracing::info!(primary = %self.primary_addr, "replica sync stopped");
    }

    /// Run one request/response round against the primary
    pub fn sync_once(&mut self) -> Result<SyncReport> {
        let result = self.round();
        if result.is_err() {
            self.link = None;
        }
        result
    }

    fn round(&mut self) -> Result<SyncReport> {
        let last = self.storage.last_segment_id();

        let link = self.link()?;
        write_sync_request(&mut link.writer, last)?;
        let mut segments = read_sync_response(&mut link.reader)?;

        let mut report = SyncReport {
            received: segments.len(),
            ..SyncReport::default()
        };
        if segments.is_empty() {
            tracing::trace!(last_segment_id = last, "nothing to sync");
            report.last_segment_id = last;
            return Ok(report);
        }

        // Arrival order is not guaranteed; ids are authoritative
        segments.sort_by_key(|segment| segment.id());

        let mut expected = last + 1;
        for segment in segments {
            let id = segment.id();
            if id <= self.storage.last_segment_id() {
                report.skipped += 1;
                continue;
            }
            if id != expected {
                tracing::warn!(expected, received = id, "gap in replicated segment ids");
            }

            self.storage.apply_replicated(segment)?;
            report.applied += 1;
            expected = id + 1;
        }

        report.last_segment_id = self.storage.last_segment_id();
        tracing::debug!(
            received = report.received,
            applied = report.applied,
            skipped = report.skipped,
            last_segment_id = report.last_segment_id,
            "sync round complete"
        );
        Ok(report)
    }

    fn link(&mut self) -> Result<&mut Link> {
        if self.link.is_none() {
            self.link = Some(self.connect()?);
        }
        self.link
            .as_mut()
            .ok_or_else(|| RelayError::Network("replication link unavailable".into()))
    }

    fn connect(&self) -> Result<Link> {
        let addr = resolve(&self.primary_addr)?;
        let stream = TcpStream::connect_timeout(&addr, self.io_timeout)
            .map_err(|e| RelayError::Network(format!("connect {}: {}", self.primary_addr, e)))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        tracing::debug!(primary = %addr, "connected to primary");
        Ok(Link {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| RelayError::Network(format!("resolve {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| RelayError::Network(format!("no address for {}", addr)))
}
