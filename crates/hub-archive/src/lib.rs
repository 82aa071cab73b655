//! RadarHub Archive Browser
//!
//! This crate browses a radar's archive one or two hours at a time:
//!
//! - **Catalog**: [`Catalog`] lists items, loads sweeps, reports calendar
//!   coverage and streams new items; [`HttpCatalog`] talks to the server
//! - **Worker**: [`run_archive_worker`] owns the authoritative [`Grid`] and
//!   every catalog call
//! - **Engine**: [`Archive`] posts tasks, guards them with request ids and
//!   watchdogs, and keeps the visible window in place as the list grows
//! - **Scrolling**: [`Scroller`] adds inertia and rubber-band edges on top of
//!   any [`ScrollTarget`], the engine included
//!
//! # Architecture
//!
//! ```text
//! Archive --ArchiveTask--> worker --Catalog calls--> server
//!    ^                        |
//!    +-------WorkerReply------+
//! ```
//!
//! The engine never blocks. Each operation returns once its task is queued;
//! the reply is folded in by [`Archive::next`].

pub mod age;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod grid;
pub mod guard;
pub mod mode;
pub mod scroller;
pub mod sse;
pub mod window;
pub mod worker;

pub use age::{age_string, Ages};
pub use catalog::{Catalog, CatchupPayload, FeedPayload, HttpCatalog, ListPayload, MonthPayload};
pub use config::ArchiveConfig;
pub use engine::{parse_day, Archive};
pub use error::ArchiveError;
pub use events::ArchiveEvent;
pub use grid::Grid;
pub use guard::{Guard, GuardKind, InFlight, RequestId};
pub use mode::{ListMode, LiveUpdate, UpdateRequest};
pub use scroller::{ScrollMode, ScrollTarget, Scroller};
pub use window::{compute_window, scroll_window, Fetch, ListShape, ListView, Window, WindowParams};
pub use worker::{run_archive_worker, ArchiveTask, WorkerReply, WorkerResponse};
