//! Error types for the archive browser

use hub_protocol::ParseError;
use thiserror::Error;

/// Errors that can occur while browsing the archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Index outside the loaded window
    #[error("index {index} out of range (0..{len})")]
    IndexOutOfRange { index: isize, len: usize },

    /// Operation needs a selected item
    #[error("no item selected")]
    NoSelection,

    /// A request of the same category is still in flight
    #[error("{0} request already in flight")]
    Busy(&'static str),

    /// The archive worker task has exited
    #[error("archive worker is gone")]
    WorkerGone,

    /// The catalog answered with an error status
    #[error("catalog returned {status}: {text}")]
    Catalog { status: u16, text: String },

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Day string is not a `YYYYMMDD` date
    #[error("invalid day: {0}")]
    InvalidDay(String),

    /// Hour outside 0-23
    #[error("invalid hour: {0}")]
    InvalidHour(u32),

    /// The catalog did not answer in time
    #[error("{0} request timed out")]
    TimedOut(&'static str),
}

impl From<serde_json::Error> for ArchiveError {
    fn from(e: serde_json::Error) -> Self {
        ArchiveError::Parse(e.into())
    }
}
