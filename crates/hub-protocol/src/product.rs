//! Radar products (moment variables)
//!
//! Every sweep and every live ray carries exactly one product. The archive
//! browser cycles through them in a fixed ring:
//!
//! ```text
//! Z -> V -> W -> D -> P -> R -> Z
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Radar moment / product variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Product {
    /// Reflectivity
    #[default]
    Z,
    /// Radial velocity
    V,
    /// Spectrum width
    W,
    /// Differential reflectivity
    D,
    /// Differential phase
    P,
    /// Cross-correlation coefficient
    R,
}

impl Product {
    /// All products in ring order
    pub const RING: [Product; 6] = [
        Product::Z,
        Product::V,
        Product::W,
        Product::D,
        Product::P,
        Product::R,
    ];

    /// Single-letter symbol used in item names and frame names
    pub fn symbol(&self) -> char {
        match self {
            Product::Z => 'Z',
            Product::V => 'V',
            Product::W => 'W',
            Product::D => 'D',
            Product::P => 'P',
            Product::R => 'R',
        }
    }

    /// Parse a single-letter symbol
    pub fn from_symbol(symbol: char) -> Option<Self> {
        Self::RING.into_iter().find(|p| p.symbol() == symbol)
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Product::Z => "Reflectivity",
            Product::V => "Velocity",
            Product::W => "Width",
            Product::D => "Differential Reflectivity",
            Product::P => "Differential Phase",
            Product::R => "Correlation Coefficient",
        }
    }

    fn position(&self) -> usize {
        Self::RING.iter().position(|p| p == self).unwrap_or(0)
    }

    /// Next product in the ring
    pub fn next(&self) -> Self {
        Self::RING[(self.position() + 1) % Self::RING.len()]
    }

    /// Previous product in the ring
    pub fn prev(&self) -> Self {
        let n = Self::RING.len();
        Self::RING[(self.position() + n - 1) % n]
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_symbol(c).ok_or_else(|| format!("unknown product {s}")),
            _ => Err(format!("unknown product {s}")),
        }
    }
}
