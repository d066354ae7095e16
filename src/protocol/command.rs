//! Command definitions
//!
//! Represents requests against the key space.

use crate::error::{RelayError, Result};

/// Largest key or value that fits the 16-bit length prefix
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Command types, with the type byte used on disk and on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Set = 0x02,
    Delete = 0x03,
}

impl CommandType {
    /// Map a persisted type byte back to a command type
    ///
    /// `Get` is never persisted, so its byte is not accepted here.
    pub fn from_persisted(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(CommandType::Set),
            0x03 => Some(CommandType::Delete),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Vec<u8> },

    /// Set a key to a value, overwriting any previous value
    Set { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key (no-op when absent)
    Delete { key: Vec<u8> },
}

impl Command {
    /// Convenience constructor for GET
    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Command::Get { key: key.into() }
    }

    /// Convenience constructor for SET
    pub fn set(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for DEL
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Command::Delete { key: key.into() }
    }

    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Set { .. } => CommandType::Set,
            Command::Delete { .. } => CommandType::Delete,
        }
    }

    /// The key this command addresses
    pub fn key(&self) -> &[u8] {
        match self {
            Command::Get { key } | Command::Set { key, .. } | Command::Delete { key } => key,
        }
    }

    /// True for commands that change state and go through the WAL
    pub fn is_write(&self) -> bool {
        !matches!(self, Command::Get { .. })
    }

    /// Check that every required argument is present and encodable
    pub fn validate(&self) -> Result<()> {
        let key = self.key();
        if key.is_empty() {
            return Err(RelayError::InvalidCommand("key must not be empty".into()));
        }
        if key.len() > MAX_FIELD_LEN {
            return Err(RelayError::InvalidCommand(format!(
                "key is {} bytes (max {})",
                key.len(),
                MAX_FIELD_LEN
            )));
        }
        if let Command::Set { value, .. } = self {
            if value.len() > MAX_FIELD_LEN {
                return Err(RelayError::InvalidCommand(format!(
                    "value is {} bytes (max {})",
                    value.len(),
                    MAX_FIELD_LEN
                )));
            }
        }
        Ok(())
    }
}
