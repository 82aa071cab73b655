//! Events emitted by the live worker
//!
//! Everything the live session learns (connection changes, status lines and
//! decoded frames) arrives through a single channel in arrival order.

use hub_protocol::frame::{ControlItem, HealthFrame};
use hub_protocol::{RayRecord, RaySkip, Response, ScopeChannels};

/// Unified event enum for live ingest
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------
    /// Transient status line ("Connecting ...", "Connect in 3 seconds")
    Message(String),

    /// The socket opened and the greeting was sent
    Connected,

    /// The socket closed (a reconnect may follow)
    Disconnected,

    // -------------------------------------------------------------------------
    // Decoded frames
    // -------------------------------------------------------------------------
    Health(HealthFrame),

    /// Control list for this session's pathway
    Control(Vec<ControlItem>),

    Scope(ScopeChannels),

    Ray(RayRecord),

    /// The ray counter jumped; logged, never fatal
    RaySkip(RaySkip),

    /// Acknowledgement of a command sent with `execute`
    Response(Response),
}
