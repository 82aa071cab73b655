//! Live frame decoding
//!
//! # Message Format
//! ```text
//! [tag: i8] [payload...]
//! ```
//!
//! | Kind | Payload |
//! |------|---------|
//! | Definition | JSON object `{name: code}` merged into the tag table |
//! | Control | JSON `{pathway, control: [{Label, Command}]}` |
//! | Health | JSON object, passed through as text |
//! | Scope | planar `i16` blocks `ch1.i, ch1.q, ch2.i, ch2.q` |
//! | Radial* | see [`crate::ray`] |
//! | Response | text, first character `A` (ack) or `N` (nak) |

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::command::Response;
use crate::error::ParseError;
use crate::ray::{RayCounter, RayHeader, RayRecord, RaySkip};
use crate::scope::{encode_scope, ScopeChannels, ScopeDecoder};
use crate::tag::TagTable;
use crate::{EncodeFrame, FrameKind, Product};

/// One entry of a pathway's control list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlItem {
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Command")]
    pub command: String,
}

impl ControlItem {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

/// Control list for a pathway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    #[serde(alias = "name")]
    pub pathway: String,
    #[serde(default, alias = "Controls")]
    pub control: Vec<ControlItem>,
}

impl EncodeFrame for ControlFrame {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        let json = serde_json::to_string(self).unwrap_or_default();
        tagged(table, FrameKind::Control, json.as_bytes())
    }
}

/// Health status, kept as the JSON text the hub sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFrame {
    json: String,
}

impl HealthFrame {
    pub fn new(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }

    /// Raw JSON text
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Parse the JSON text
    pub fn value(&self) -> Result<serde_json::Value, ParseError> {
        Ok(serde_json::from_str(&self.json)?)
    }
}

impl EncodeFrame for HealthFrame {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        tagged(table, FrameKind::Health, self.json.as_bytes())
    }
}

/// Tag table update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionFrame(pub TagTable);

impl EncodeFrame for DefinitionFrame {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        let json = serde_json::to_string(&self.0).unwrap_or_default();
        tagged(table, FrameKind::Definition, json.as_bytes())
    }
}

/// Raw scope samples for encoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFrame {
    pub ch1: Vec<(i16, i16)>,
    pub ch2: Vec<(i16, i16)>,
}

impl EncodeFrame for ScopeFrame {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        tagged(table, FrameKind::Scope, &encode_scope(&self.ch1, &self.ch2))
    }
}

/// Radial ray for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayFrame {
    pub product: Product,
    pub header: RayHeader,
    pub values: Vec<u8>,
}

impl EncodeFrame for RayFrame {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        let mut payload = Vec::with_capacity(crate::ray::RAY_HEADER_LEN + self.values.len());
        self.header.encode_into(&mut payload);
        payload.extend_from_slice(&self.values);
        tagged(table, FrameKind::radial(self.product), &payload)
    }
}

impl EncodeFrame for Response {
    fn encode(&self, table: &TagTable) -> Vec<u8> {
        tagged(table, FrameKind::Response, self.to_wire().as_bytes())
    }
}

fn tagged(table: &TagTable, kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    let tag = table.code_for(kind).unwrap_or(0);
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tag as u8);
    out.extend_from_slice(payload);
    out
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlFrame),
    Health(HealthFrame),
    Scope(ScopeChannels),
    Ray {
        ray: RayRecord,
        /// Set when one or more rays went missing before this one
        skip: Option<RaySkip>,
    },
    Response(Response),
}

/// Session-owned decoder state
///
/// Holds the tag table, the pathway used to filter control frames, the ray
/// counter tracker and the reusable scope buffers.
#[derive(Debug)]
pub struct FrameDecoder {
    table: TagTable,
    pathway: String,
    rays: RayCounter,
    scope: ScopeDecoder,
    tic: u64,
}

impl FrameDecoder {
    /// Decoder with the default tag table
    pub fn new(pathway: impl Into<String>) -> Self {
        Self::with_table(pathway, TagTable::default())
    }

    pub fn with_table(pathway: impl Into<String>, table: TagTable) -> Self {
        Self {
            table,
            pathway: pathway.into(),
            rays: RayCounter::new(),
            scope: ScopeDecoder::new(),
            tic: 0,
        }
    }

    pub fn table(&self) -> &TagTable {
        &self.table
    }

    pub fn pathway(&self) -> &str {
        &self.pathway
    }

    /// Switch pathway and forget ray history
    pub fn set_pathway(&mut self, pathway: impl Into<String>) {
        self.pathway = pathway.into();
        self.rays.reset();
    }

    /// Forget ray history (after a reconnect)
    pub fn reset(&mut self) {
        self.rays.reset();
    }

    /// Total ray-counter skips seen
    pub fn skips(&self) -> u64 {
        self.rays.skips()
    }

    /// Decode one message
    ///
    /// Returns `Ok(None)` for frames that produce no record: `Definition`
    /// (merged into the tag table), control frames for another pathway and
    /// unknown tags.
    pub fn decode(&mut self, data: &[u8]) -> Result<Option<Frame>, ParseError> {
        let (&tag, payload) = data.split_first().ok_or(ParseError::Empty)?;
        let Some(kind) = self.table.resolve(tag as i8) else {
            trace!("Ignoring frame with unmapped tag {}", tag as i8);
            return Ok(None);
        };

        match kind {
            FrameKind::Definition => {
                let update: TagTable = serde_json::from_slice(payload)?;
                debug!("Merging {} tag definitions", update.len());
                self.table.merge(&update);
                Ok(None)
            }
            FrameKind::Control => {
                let control: ControlFrame = serde_json::from_slice(payload)?;
                if control.pathway != self.pathway {
                    debug!(
                        "Dropping control for pathway {} (session is {})",
                        control.pathway, self.pathway
                    );
                    return Ok(None);
                }
                Ok(Some(Frame::Control(control)))
            }
            FrameKind::Health => {
                let text = std::str::from_utf8(payload)?;
                Ok(Some(Frame::Health(HealthFrame::new(text))))
            }
            FrameKind::Scope => Ok(Some(Frame::Scope(self.scope.decode(payload).clone()))),
            FrameKind::Response => {
                let text = std::str::from_utf8(payload)?;
                Ok(Some(Frame::Response(Response::parse(text))))
            }
            radial => {
                let product = radial.product().unwrap_or_default();
                let (header, samples) = RayHeader::parse(payload)?;
                let observation = self.rays.observe(header.flag);
                if let Some(skip) = observation.skip {
                    warn!(
                        "Ray counter skipped: expected {} got {}",
                        skip.expected, skip.got
                    );
                }
                let mut ray = RayRecord::from_header(product, &header, samples, self.tic);
                ray.clear = observation.new_sweep;
                self.tic += 1;
                Ok(Some(Frame::Ray {
                    ray,
                    skip: observation.skip,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message() {
        let mut decoder = FrameDecoder::new("px1000");
        assert_eq!(decoder.decode(&[]), Err(ParseError::Empty));
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let mut decoder = FrameDecoder::new("px1000");
        assert_eq!(decoder.decode(&[99, 1, 2, 3]), Ok(None));
    }

    #[test]
    fn test_definition_merges_without_record() {
        let mut decoder = FrameDecoder::new("px1000");
        let update: TagTable = [("Health".to_string(), 40)].into_iter().collect();
        let bytes = DefinitionFrame(update).encode(decoder.table());
        assert_eq!(decoder.decode(&bytes), Ok(None));
        assert_eq!(decoder.table().code("Health"), Some(40));

        let mut health = vec![40u8];
        health.extend_from_slice(b"{}");
        assert!(matches!(decoder.decode(&health), Ok(Some(Frame::Health(_)))));
    }

    #[test]
    fn test_control_pathway_filter() {
        let mut decoder = FrameDecoder::new("px1000");
        let table = TagTable::default();
        let mine = ControlFrame {
            pathway: "px1000".into(),
            control: vec![ControlItem::new("Go", "t y")],
        };
        let other = ControlFrame {
            pathway: "raxpol".into(),
            control: vec![],
        };
        assert!(matches!(
            decoder.decode(&mine.encode(&table)),
            Ok(Some(Frame::Control(c))) if c.control.len() == 1
        ));
        assert_eq!(decoder.decode(&other.encode(&table)), Ok(None));
    }

    #[test]
    fn test_control_accepts_hub_aliases() {
        let mut decoder = FrameDecoder::new("demo");
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(br#"{"name":"demo","Controls":[{"Label":"Stop","Command":"t z"}]}"#);
        match decoder.decode(&bytes) {
            Ok(Some(Frame::Control(c))) => assert_eq!(c.control[0].command, "t z"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_response_frame() {
        let mut decoder = FrameDecoder::new("px1000");
        let bytes = Response::ack("ACK t y").encode(&TagTable::default());
        match decoder.decode(&bytes) {
            Ok(Some(Frame::Response(r))) => {
                assert!(r.is_ack());
                assert_eq!(r.text, "ACK t y");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ray_tic_and_clear() {
        let mut decoder = FrameDecoder::new("px1000");
        let table = TagTable::default();
        let frame = |counter: u8, sweep: u8| RayFrame {
            product: Product::Z,
            header: RayHeader {
                flag: RayHeader::make_flag(counter, sweep),
                sample_count: 4,
                range_delta: 30,
                ..Default::default()
            },
            values: vec![1, 2, 3, 4],
        };

        let mut rays = Vec::new();
        for (c, s) in [(0, 0), (1, 0), (2, 1)] {
            if let Ok(Some(Frame::Ray { ray, .. })) = decoder.decode(&frame(c, s).encode(&table)) {
                rays.push(ray);
            }
        }
        assert_eq!(rays.len(), 3);
        assert_eq!(rays.iter().map(|r| r.tic).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(
            rays.iter().map(|r| r.clear).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_truncated_ray_is_error() {
        let mut decoder = FrameDecoder::new("px1000");
        assert!(matches!(
            decoder.decode(&[4, 0, 0, 0]),
            Err(ParseError::Incomplete { .. })
        ));
    }
}
