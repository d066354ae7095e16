//! Binary codec
//!
//! Deterministic encoding shared by WAL files and replication transfers.
//! There is no version byte and no schema; every integer is big-endian.
//!
//! ## Segment
//! ```text
//! ┌──────────┬───────────┬──────────────────────────────┐
//! │ ID (8)   │ Count (4) │ Count × Command              │
//! └──────────┴───────────┴──────────────────────────────┘
//! ```
//!
//! ## Command
//! ```text
//! ┌──────────┬─────────────┬──────┬───────────────┬────────┐
//! │ Type (1) │ KeyLen (2)  │ Key  │ ValLen (2)    │ Value  │
//! └──────────┴─────────────┴──────┴───────────────┴────────┘
//!                                   (SET only)
//! ```
//! Type bytes: SET = 0x02, DEL = 0x03. GET is never encoded.
//!
//! ## Replication frames
//! - Request:  after_id (8, signed)
//! - Response: segment_count (4) followed by that many segments

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, RelayError, Result};
use crate::wal::{Segment, SegmentId};
use super::{Command, CommandType, MAX_FIELD_LEN};

/// Segment header size: id (8) + command count (4)
pub const SEGMENT_HEADER_SIZE: usize = 12;

/// Size of a replication request frame
pub const REQUEST_SIZE: usize = 8;

/// Commands pre-allocated per decoded segment, whatever the header claims
const MAX_PREALLOCATED_COMMANDS: usize = 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Number of bytes `encode_command` produces for this command
pub fn encoded_command_len(command: &Command) -> usize {
    match command {
        Command::Get { .. } => 0,
        Command::Set { key, value } => 1 + 2 + key.len() + 2 + value.len(),
        Command::Delete { key } => 1 + 2 + key.len(),
    }
}

/// Encode a command into `buf`
///
/// Format: type (1) + key_len (2) + key [+ value_len (2) + value]
pub fn encode_command(command: &Command, buf: &mut BytesMut) -> Result<()> {
    match command {
        Command::Get { .. } => Err(RelayError::InvalidCommand(
            "GET is read-only and never persisted".to_string(),
        )),
        Command::Set { key, value } => {
            buf.reserve(encoded_command_len(command));
            buf.put_u8(CommandType::Set as u8);
            put_field(buf, key, "key")?;
            put_field(buf, value, "value")
        }
        Command::Delete { key } => {
            buf.reserve(encoded_command_len(command));
            buf.put_u8(CommandType::Delete as u8);
            put_field(buf, key, "key")
        }
    }
}

/// Decode one command from a stream
///
/// The caller already knows a command is due, so any end of input here is
/// a truncation.
pub fn decode_command<R: Read>(reader: &mut R) -> Result<Command> {
    let mut type_byte = [0u8; 1];
    read_exact(reader, &mut type_byte, "command type")?;

    let command_type = CommandType::from_persisted(type_byte[0])
        .ok_or(DecodeError::UnknownCommandType(type_byte[0]))?;

    let key = read_field(reader, "key")?;
    match command_type {
        CommandType::Set => {
            let value = read_field(reader, "value")?;
            Ok(Command::Set { key, value })
        }
        CommandType::Delete => Ok(Command::Delete { key }),
        CommandType::Get => Err(DecodeError::UnknownCommandType(type_byte[0]).into()),
    }
}

// =============================================================================
// Segment Encoding/Decoding
// =============================================================================

/// Encode a segment into `buf`
pub fn encode_segment(segment: &Segment, buf: &mut BytesMut) -> Result<()> {
    let count = u32::try_from(segment.len()).map_err(|_| {
        RelayError::InvalidCommand(format!("segment {} has too many commands", segment.id()))
    })?;

    buf.reserve(segment.encoded_len());
    buf.put_i64(segment.id());
    buf.put_u32(count);
    for command in segment.commands() {
        encode_command(command, buf)?;
    }
    Ok(())
}

/// Encode a segment into a standalone buffer
pub fn segment_to_bytes(segment: &Segment) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(segment.encoded_len());
    encode_segment(segment, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode the next segment from a stream
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte of
/// a segment. Ending anywhere inside a segment is `DecodeError::Truncated`.
pub fn decode_segment<R: Read>(reader: &mut R) -> Result<Option<Segment>> {
    let mut id_bytes = [0u8; 8];
    if !read_exact_or_eof(reader, &mut id_bytes, "segment id")? {
        return Ok(None);
    }
    let id = i64::from_be_bytes(id_bytes);
    if id < 1 {
        return Err(DecodeError::InvalidSegmentId(id).into());
    }

    let mut count_bytes = [0u8; 4];
    read_exact(reader, &mut count_bytes, "segment command count")?;
    let count = u32::from_be_bytes(count_bytes) as usize;

    let mut commands = Vec::with_capacity(count.min(MAX_PREALLOCATED_COMMANDS));
    for _ in 0..count {
        commands.push(decode_command(reader)?);
    }

    Ok(Some(Segment::from_parts(id, commands)))
}

/// Decode every segment in a byte buffer, in order
pub fn decode_segments(data: &[u8]) -> Result<Vec<Segment>> {
    let mut reader = data;
    let mut segments = Vec::new();
    while let Some(segment) = decode_segment(&mut reader)? {
        segments.push(segment);
    }
    Ok(segments)
}

// =============================================================================
// Replication Frames
// =============================================================================

/// Send "segments after `after_id`"
pub fn write_sync_request<W: Write>(writer: &mut W, after_id: SegmentId) -> Result<()> {
    writer.write_all(&after_id.to_be_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read a request; `Ok(None)` means the peer closed the connection
pub fn read_sync_request<R: Read>(reader: &mut R) -> Result<Option<SegmentId>> {
    let mut frame = [0u8; REQUEST_SIZE];
    if !read_exact_or_eof(reader, &mut frame, "sync request")? {
        return Ok(None);
    }
    Ok(Some(i64::from_be_bytes(frame)))
}

/// Send the count and bytes of every segment in `segments`
pub fn write_sync_response<W: Write>(writer: &mut W, segments: &[Arc<Segment>]) -> Result<()> {
    let count = u32::try_from(segments.len())
        .map_err(|_| RelayError::Network("too many segments for one response".into()))?;

    let body_len: usize = segments.iter().map(|s| s.encoded_len()).sum();
    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_u32(count);
    for segment in segments {
        encode_segment(segment, &mut buf)?;
    }

    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read a response: a count followed by exactly that many segments
///
/// A count of zero returns an empty list without reading further.
pub fn read_sync_response<R: Read>(reader: &mut R) -> Result<Vec<Segment>> {
    let mut count_bytes = [0u8; 4];
    read_exact(reader, &mut count_bytes, "segment count")?;
    let count = u32::from_be_bytes(count_bytes) as usize;

    let mut segments = Vec::with_capacity(count.min(MAX_PREALLOCATED_COMMANDS));
    for _ in 0..count {
        match decode_segment(reader)? {
            Some(segment) => segments.push(segment),
            None => return Err(DecodeError::Truncated { context: "segment list" }.into()),
        }
    }
    Ok(segments)
}

// =============================================================================
// Helpers
// =============================================================================

fn put_field(buf: &mut BytesMut, field: &[u8], name: &str) -> Result<()> {
    if field.len() > MAX_FIELD_LEN {
        return Err(RelayError::InvalidCommand(format!(
            "{} is {} bytes (max {})",
            name,
            field.len(),
            MAX_FIELD_LEN
        )));
    }
    buf.put_u16(field.len() as u16);
    buf.put_slice(field);
    Ok(())
}

fn read_field<R: Read>(reader: &mut R, context: &'static str) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 2];
    read_exact(reader, &mut len_bytes, context)?;
    let len = u16::from_be_bytes(len_bytes) as usize;

    let mut field = vec![0u8; len];
    read_exact(reader, &mut field, context)?;
    Ok(field)
}

/// `read_exact` with end of stream reported as a truncation
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], context: &'static str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(DecodeError::Truncated { context }.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Fill `buf`, or return `false` if the stream ends before its first byte
fn read_exact_or_eof<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(DecodeError::Truncated { context }.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
