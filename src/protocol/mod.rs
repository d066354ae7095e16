//! Protocol Module
//!
//! Commands, the text line protocol spoken by clients, and the binary codec
//! used for WAL files and replication.
//!
//! ### Line Protocol
//! Requests are whitespace-separated tokens, one request per line:
//! - `GET name`
//! - `SET name value`
//! - `DEL name`
//!
//! Each request gets exactly one reply line:
//! - the value (GET)
//! - `OK` (SET / DEL)
//! - `NOT_FOUND`
//! - `ERROR <message>`

mod command;
mod parser;
mod response;
pub mod codec;

pub use command::{Command, CommandType, MAX_FIELD_LEN};
pub use parser::parse_line;
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_segment, decode_segments, encode_command, encode_segment,
    segment_to_bytes,
};
