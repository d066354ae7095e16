//! Primary-side responder
//!
//! Answers "segments after ID" requests from replicas, one request/response
//! pair at a time, for as long as the replica keeps the connection open.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::network::{is_disconnect, Service};
use crate::protocol::codec::{read_sync_request, write_sync_response};
use crate::wal::Wal;

/// [`Service`] run by the primary's replication server
pub struct PrimaryService {
    wal: Arc<Wal>,
}

impl PrimaryService {
    pub fn new(wal: Arc<Wal>) -> Self {
        Self { wal }
    }
}

impl Service for PrimaryService {
    fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let after_id = match read_sync_request(&mut reader) {
                Ok(Some(id)) => id,
                Ok(None) => {
                    tracing::debug!(%peer, "replica disconnected");
                    return Ok(());
                }
                Err(RelayError::Io(e)) if is_disconnect(&e) => {
                    tracing::debug!(%peer, reason = %e, "replica connection idle or dropped");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let segments = self.wal.segments_after(after_id);
            tracing::debug!(
                %peer,
                after_id,
                segments = segments.len(),
                "serving sync request"
            );

            match write_sync_response(&mut writer, &segments) {
                Ok(()) => {}
                Err(RelayError::Io(e)) if is_disconnect(&e) => {
                    tracing::debug!(%peer, reason = %e, "replica gone before response");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}
