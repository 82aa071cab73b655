//! Error types for live ingest

use thiserror::Error;

/// Errors from the ray ring buffer
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Dequeue was called with nothing pending
    #[error("ring buffer is empty")]
    Empty,
}

/// Errors from a socket transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be opened
    #[error("connect to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The link is closed
    #[error("link closed")]
    Closed,
}

/// Errors surfaced by the live session
#[derive(Debug, Error)]
pub enum IngestError {
    /// The live worker task has exited
    #[error("live worker is gone")]
    WorkerGone,

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Dequeue from an empty buffer
    #[error(transparent)]
    Ring(#[from] RingError),
}
