//! RadarHub Protocol Library
//!
//! This crate decodes and encodes the data a RadarHub client receives:
//!
//! - **Live frames**: tagged binary messages pushed over a WebSocket
//!   (definition, control, health, scope, radial rays, command responses)
//! - **Archived sweeps**: binary sweep files loaded from the archive server
//! - **Item names**: `YYYYMMDD-HHMMSS-SCAN-SYMBOL` catalog entries
//!
//! # Architecture
//!
//! The first byte of every live message is a tag. The tag-to-kind mapping is
//! owned by the session ([`TagTable`]) and can be changed by the hub at any time
//! through a `Definition` frame, which is merged rather than replaced.
//! [`FrameDecoder`] holds that table plus the per-session counters needed to
//! detect skipped rays and the reusable scope buffers.
//!
//! # Example
//!
//! ```rust
//! use hub_protocol::{EncodeFrame, Frame, FrameDecoder, TagTable};
//! use hub_protocol::frame::HealthFrame;
//!
//! let table = TagTable::default();
//! let bytes = HealthFrame::new(r#"{"Transceiver":{"Value":true}}"#).encode(&table);
//!
//! let mut decoder = FrameDecoder::new("px1000");
//! match decoder.decode(&bytes) {
//!     Ok(Some(Frame::Health(health))) => assert!(health.json().contains("Transceiver")),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod item;
pub mod product;
pub mod ray;
pub mod scope;
pub mod sweep;
pub mod tag;

pub use command::{Command, Response, ResponseKind};
pub use error::ParseError;
pub use frame::{Frame, FrameDecoder};
pub use item::ItemName;
pub use product::Product;
pub use ray::{RayCounter, RayRecord, RaySkip};
pub use scope::{ScopeChannels, ScopeDecoder};
pub use sweep::Sweep;
pub use tag::{merge_tag_table, TagTable};

/// Kinds of frame a hub can send
///
/// The order of [`FrameKind::ALL`] breaks ties when the hub maps two names to
/// the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Tag table update (JSON object of name to code)
    Definition,
    /// Control list for the pathway (JSON)
    Control,
    /// Health status (JSON)
    Health,
    /// I/Q samples for two channels
    Scope,
    /// Command acknowledgement (text with a leading sigil)
    Response,
    RadialZ,
    RadialV,
    RadialW,
    RadialD,
    RadialP,
    RadialR,
}

impl FrameKind {
    /// Every kind in resolution priority order
    pub const ALL: [FrameKind; 11] = [
        FrameKind::Definition,
        FrameKind::Control,
        FrameKind::Health,
        FrameKind::Scope,
        FrameKind::Response,
        FrameKind::RadialZ,
        FrameKind::RadialV,
        FrameKind::RadialW,
        FrameKind::RadialD,
        FrameKind::RadialP,
        FrameKind::RadialR,
    ];

    /// Symbolic name used in the tag table
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Definition => "Definition",
            FrameKind::Control => "Control",
            FrameKind::Health => "Health",
            FrameKind::Scope => "Scope",
            FrameKind::Response => "Response",
            FrameKind::RadialZ => "RadialZ",
            FrameKind::RadialV => "RadialV",
            FrameKind::RadialW => "RadialW",
            FrameKind::RadialD => "RadialD",
            FrameKind::RadialP => "RadialP",
            FrameKind::RadialR => "RadialR",
        }
    }

    /// Product carried by a radial kind
    pub fn product(&self) -> Option<Product> {
        match self {
            FrameKind::RadialZ => Some(Product::Z),
            FrameKind::RadialV => Some(Product::V),
            FrameKind::RadialW => Some(Product::W),
            FrameKind::RadialD => Some(Product::D),
            FrameKind::RadialP => Some(Product::P),
            FrameKind::RadialR => Some(Product::R),
            _ => None,
        }
    }

    /// Radial kind for a product
    pub fn radial(product: Product) -> Self {
        match product {
            Product::Z => FrameKind::RadialZ,
            Product::V => FrameKind::RadialV,
            Product::W => FrameKind::RadialW,
            Product::D => FrameKind::RadialD,
            Product::P => FrameKind::RadialP,
            Product::R => FrameKind::RadialR,
        }
    }
}

/// Frames that can be encoded to their wire format
///
/// Hubs produce these; the client only needs encoding for simulation and tests.
pub trait EncodeFrame {
    /// Encode this frame, tagged according to `table`
    ///
    /// Kinds missing from the table are tagged `0`.
    fn encode(&self, table: &TagTable) -> Vec<u8>;
}
