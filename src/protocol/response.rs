//! Response definitions
//!
//! One reply line per request on the line protocol.

use crate::error::RelayError;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Error,
}

/// A response to send to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, error message for ERROR)
    pub payload: Option<Vec<u8>>,
}

const OK_LINE: &str = "OK";
/// Reply for a missing key; the line parser refuses it as a value
pub const NOT_FOUND_LINE: &str = "NOT_FOUND";
const ERROR_PREFIX: &str = "ERROR ";

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Map the outcome of executing a command to a response
    pub fn from_result(result: crate::Result<Option<Vec<u8>>>) -> Self {
        match result {
            Ok(value) => Response::ok(value),
            Err(RelayError::NotFound) => Response::not_found(),
            Err(e) => Response::error(&e.to_string()),
        }
    }

    /// Render as a single reply line (without the trailing newline)
    pub fn to_line(&self) -> String {
        match (self.status, &self.payload) {
            (Status::Ok, Some(value)) => String::from_utf8_lossy(value).into_owned(),
            (Status::Ok, None) => OK_LINE.to_string(),
            (Status::NotFound, _) => NOT_FOUND_LINE.to_string(),
            (Status::Error, payload) => {
                let message = payload
                    .as_deref()
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default();
                // Keep the reply on one line
                format!("{}{}", ERROR_PREFIX, message.replace(['\r', '\n'], " "))
            }
        }
    }

    /// Parse a reply line produced by [`Response::to_line`]
    ///
    /// A bare `OK` is read as an acknowledged write; any other non-error
    /// line is a value. Use [`Response::from_value_line`] for GET replies,
    /// where `OK` may itself be the stored value.
    pub fn from_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == OK_LINE {
            Response::ok(None)
        } else if line == NOT_FOUND_LINE {
            Response::not_found()
        } else if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            Response::error(message)
        } else {
            Response::ok(Some(line.as_bytes().to_vec()))
        }
    }

    /// Parse the reply to a GET: every line that is neither `NOT_FOUND`
    /// nor an error is the value, including a bare `OK`
    pub fn from_value_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == NOT_FOUND_LINE {
            Response::not_found()
        } else if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            Response::error(message)
        } else {
            Response::ok(Some(line.as_bytes().to_vec()))
        }
    }
}
