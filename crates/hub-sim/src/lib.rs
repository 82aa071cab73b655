//! RadarHub Simulation Library
//!
//! This crate stands in for a radar hub and an archive server so the live
//! and archive sessions can run without a network. It includes:
//!
//! - **VirtualRadar**: produces protocol-accurate hub frames and answers
//!   control commands with ack/nak responses
//! - **SimConnector**: a [`hub_ingest::Connector`] that serves every link from
//!   a fresh virtual radar task
//! - **MemoryCatalog**: a [`hub_archive::Catalog`] over a synthetic span of
//!   volumes that keeps growing while its live feed is open
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_ingest::{Live, LiveConfig};
//! use hub_sim::SimConnector;
//!
//! let mut live = Live::spawn(SimConnector::default(), LiveConfig::default());
//! live.connect("ws://sim/ws/demo/", "demo").await?;
//! while let Some(event) = live.next().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod catalog;
pub mod radar;
pub mod radar_task;

pub use catalog::{MemoryCatalog, MemoryCatalogConfig};
pub use radar::{VirtualRadar, VirtualRadarConfig};
pub use radar_task::{run_virtual_radar, SimCommand, SimConnector};
