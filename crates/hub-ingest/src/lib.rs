//! RadarHub Live Ingest
//!
//! This crate connects to a RadarHub and turns its socket stream into
//! displayable state:
//!
//! - **Transport**: [`Connector`] opens a [`Link`]; [`WsConnector`] is the
//!   WebSocket implementation
//! - **Worker**: [`run_live_worker`] decodes frames and owns the reconnect
//!   countdown, emitting [`LiveEvent`]s
//! - **Session**: [`Live`] folds events into state and buffers rays in a
//!   fixed-capacity [`RingBuffer`] for the renderer
//!
//! # Channel-Based Architecture
//!
//! The worker and the session share nothing. Commands flow in through one
//! channel and events flow out through another, so the session can live on
//! a UI thread while the worker runs on the runtime.

pub mod config;
pub mod error;
pub mod events;
pub mod live;
pub mod reconnect;
pub mod ring;
pub mod session;
pub mod transport;

pub use config::{LiveConfig, DEFAULT_RAY_CAPACITY, TEXTURE_RAY_CAPACITY};
pub use error::{IngestError, RingError, TransportError};
pub use events::LiveEvent;
pub use live::{run_live_worker, Live, LiveCommand};
pub use reconnect::{ReconnectStep, ReconnectTimer};
pub use ring::RingBuffer;
pub use session::SessionCore;
pub use transport::{socket_url, Connector, Link, LinkEvent, WsConnector};
