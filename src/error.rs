//! Error types for RelayKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for RelayKV operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Command Errors (user-visible, never fatal)
    // -------------------------------------------------------------------------
    #[error("key not found")]
    NotFound,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("replica is read only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),

    #[error("write-ahead log is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while decoding commands and segments
///
/// `Truncated` means the input ended inside a record. A stream that ends
/// exactly on a segment boundary is not an error at all; decoders report it
/// as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream while reading {context}")]
    Truncated { context: &'static str },

    #[error("unknown command type byte 0x{0:02x}")]
    UnknownCommandType(u8),

    #[error("invalid segment id {0}")]
    InvalidSegmentId(i64),
}

impl RelayError {
    /// True for errors that are reported to a client and leave the node healthy
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RelayError::NotFound
                | RelayError::InvalidCommand(_)
                | RelayError::UnknownCommand(_)
                | RelayError::ReadOnly
        )
    }

    /// Combine a batch-wide disk failure with one command's apply outcome
    ///
    /// A disk failure poisons every member of the batch; an apply failure
    /// belongs to that command only.
    pub fn aggregate(disk: Option<&str>, applied: Result<()>) -> Result<()> {
        match (disk, applied) {
            (None, applied) => applied,
            (Some(disk), Ok(())) => Err(RelayError::Persistence(disk.to_string())),
            (Some(disk), Err(apply)) => Err(RelayError::Persistence(format!(
                "{}; apply also failed: {}",
                disk, apply
            ))),
        }
    }
}
