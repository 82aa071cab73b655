//! Dynamic frame tag table
//!
//! The first byte of every hub message is a tag. Which tag means which frame
//! kind is decided by the hub at runtime: it announces its table in a
//! `Definition` frame (a JSON object `{"Health": 3, ...}`) which is merged
//! into the table the session already holds. Entries are overridden or
//! extended, never reset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::FrameKind;

/// Mapping from symbolic frame names to tag codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagTable {
    codes: BTreeMap<String, i64>,
}

impl TagTable {
    /// Create an empty table (every tag resolves to nothing)
    pub fn empty() -> Self {
        Self {
            codes: BTreeMap::new(),
        }
    }

    /// Look up the code for a symbolic name
    pub fn code(&self, name: &str) -> Option<i64> {
        self.codes.get(name).copied()
    }

    /// Code for a frame kind, if mapped
    pub fn code_for(&self, kind: FrameKind) -> Option<i8> {
        self.code(kind.name()).and_then(|c| i8::try_from(c).ok())
    }

    /// Set a single entry
    pub fn insert(&mut self, name: impl Into<String>, code: i64) {
        self.codes.insert(name.into(), code);
    }

    /// Number of entries, including names this client does not know about
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Resolve a tag byte to a frame kind
    ///
    /// When several names share a code the first in [`FrameKind::ALL`] order
    /// wins, so `Definition` is always recognisable. Tags with no known name
    /// resolve to `None` and are ignored by the decoder.
    pub fn resolve(&self, tag: i8) -> Option<FrameKind> {
        FrameKind::ALL
            .into_iter()
            .find(|kind| self.code(kind.name()) == Some(i64::from(tag)))
    }

    /// Merge an update into this table in place
    pub fn merge(&mut self, update: &TagTable) {
        for (name, code) in &update.codes {
            self.codes.insert(name.clone(), *code);
        }
    }

    /// Iterate over `(name, code)` entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.codes.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for TagTable {
    /// The table used before the hub has announced its own.
    ///
    /// Mirrors the codes of the reporter firmware (`Control = 2`,
    /// `Health = 3`, ray `= 4`, `Scope = 5`, response `= 6`), with the
    /// handshake slot reused for `Definition` since clients never receive
    /// handshakes.
    fn default() -> Self {
        let mut table = Self::empty();
        for (kind, code) in [
            (FrameKind::Definition, 1),
            (FrameKind::Control, 2),
            (FrameKind::Health, 3),
            (FrameKind::RadialZ, 4),
            (FrameKind::Scope, 5),
            (FrameKind::Response, 6),
            (FrameKind::RadialV, 7),
            (FrameKind::RadialW, 8),
            (FrameKind::RadialD, 9),
            (FrameKind::RadialP, 10),
            (FrameKind::RadialR, 11),
        ] {
            table.insert(kind.name(), code);
        }
        table
    }
}

impl FromIterator<(String, i64)> for TagTable {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

/// Merge a `Definition` update into a table, returning the new table
///
/// New entries override or extend; nothing is ever removed. Applying the
/// same update twice yields the same table as applying it once.
pub fn merge_tag_table(old: &TagTable, update: &TagTable) -> TagTable {
    let mut merged = old.clone();
    merged.merge(update);
    merged
}
