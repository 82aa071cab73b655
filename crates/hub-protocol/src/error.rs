//! Error types for RadarHub frame parsing

use thiserror::Error;

/// Errors that can occur while parsing hub data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Message carried no bytes at all, not even a tag
    #[error("empty message")]
    Empty,

    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// JSON payload could not be decoded
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Text payload was not valid UTF-8
    #[error("invalid UTF-8 payload")]
    InvalidUtf8,

    /// Archive item name does not follow `YYYYMMDD-HHMMSS-SCAN-SYMBOL`
    #[error("invalid item name: {0}")]
    InvalidItemName(String),

    /// Archived sweep is structurally unusable
    #[error("invalid sweep: {0}")]
    InvalidSweep(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::InvalidJson(e.to_string())
    }
}

impl From<std::str::Utf8Error> for ParseError {
    fn from(_: std::str::Utf8Error) -> Self {
        ParseError::InvalidUtf8
    }
}
