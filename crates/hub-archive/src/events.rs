//! Events surfaced by the archive engine
//!
//! [`crate::Archive::next`] folds each accepted worker reply into state and
//! says what changed. Stale replies never show up here.

use crate::guard::GuardKind;
use crate::mode::LiveUpdate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------
    /// Item list or selection changed
    Grid,

    /// A new sweep is ready to draw
    Sweep,

    /// Calendar coverage changed
    Month,

    /// Age strings of the visible rows changed
    Age,

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------
    Message(String),

    /// Live-update mode as reported by the worker
    State(Option<LiveUpdate>),

    /// The server refused a sweep; the current one was dropped
    Reset(String),

    /// A guarded request went unanswered and its guard was released
    Watchdog(GuardKind),
}
