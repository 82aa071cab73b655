//! Radial ray frames
//!
//! # Payload Format
//! ```text
//! [tag] [flag] [el0 el0] [el1 el1] [az0 az0] [az1 az1] [r0 r0] [dr dr] [n n] [values...]
//! ```
//!
//! All multi-byte fields are little-endian:
//! - `flag`: low 6 bits ray counter, high 2 bits sweep counter
//! - `el0`/`el1`: elevation start/end, `i16`, scaled by 180/32768
//! - `az0`/`az1`: azimuth start/end, `u16`, scaled by 180/32768
//! - `r0`: range of the first sample in metres (`u16`)
//! - `dr`: sample spacing in metres (`u16`)
//! - `n`: sample count (`u16`), followed by `n` magnitude bytes

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ParseError;
use crate::geometry::{scale, unit_vector, Vec3};
use crate::Product;

/// Bytes between the tag and the sample values
pub const RAY_HEADER_LEN: usize = 15;

/// Largest number of samples a ray carries into the renderer
pub const MAX_RAY_SAMPLES: usize = 512;

/// Degrees per raw angle unit
pub const ANGLE_SCALE: f32 = 180.0 / 32768.0;

/// Kilometres per raw range unit
pub const RANGE_SCALE_KM: f32 = 0.001;

/// Ray counter modulus (6 bits)
pub const RAY_COUNTER_MODULUS: u8 = 64;

/// Convert a signed raw angle to degrees
pub fn angle_from_i16(raw: i16) -> f32 {
    f32::from(raw) * ANGLE_SCALE
}

/// Convert an unsigned raw angle to degrees
pub fn angle_from_u16(raw: u16) -> f32 {
    f32::from(raw) * ANGLE_SCALE
}

/// Quantize an elevation in degrees to its raw wire form
pub fn elevation_to_raw(deg: f32) -> i16 {
    (deg / ANGLE_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Quantize an azimuth in degrees to its raw wire form (wrapped into 0..360)
pub fn azimuth_to_raw(deg: f32) -> u16 {
    let wrapped = deg.rem_euclid(360.0);
    ((wrapped / ANGLE_SCALE).round() as u32 % 65536) as u16
}

/// Fixed header of a radial frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayHeader {
    /// Ray counter (6 bits) and sweep counter (2 bits)
    pub flag: u8,
    pub elevation_start: i16,
    pub elevation_end: i16,
    pub azimuth_start: u16,
    pub azimuth_end: u16,
    /// Metres
    pub range_start: u16,
    /// Metres
    pub range_delta: u16,
    pub sample_count: u16,
}

impl RayHeader {
    /// Build a flag byte from its two counters
    pub fn make_flag(ray_counter: u8, sweep_counter: u8) -> u8 {
        (ray_counter % RAY_COUNTER_MODULUS) | ((sweep_counter & 0x03) << 6)
    }

    /// 6-bit ray counter
    pub fn ray_counter(&self) -> u8 {
        self.flag & 0x3F
    }

    /// 2-bit sweep counter
    pub fn sweep_counter(&self) -> u8 {
        self.flag >> 6
    }

    /// Parse the header from a payload (tag already stripped)
    ///
    /// Returns the header and the remaining sample bytes.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        if payload.len() < RAY_HEADER_LEN {
            return Err(ParseError::Incomplete {
                needed: RAY_HEADER_LEN - payload.len(),
            });
        }
        let i16_at = |o: usize| i16::from_le_bytes([payload[o], payload[o + 1]]);
        let u16_at = |o: usize| u16::from_le_bytes([payload[o], payload[o + 1]]);
        let header = Self {
            flag: payload[0],
            elevation_start: i16_at(1),
            elevation_end: i16_at(3),
            azimuth_start: u16_at(5),
            azimuth_end: u16_at(7),
            range_start: u16_at(9),
            range_delta: u16_at(11),
            sample_count: u16_at(13),
        };
        Ok((header, &payload[RAY_HEADER_LEN..]))
    }

    /// Encode the header (without tag)
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.flag);
        out.extend_from_slice(&self.elevation_start.to_le_bytes());
        out.extend_from_slice(&self.elevation_end.to_le_bytes());
        out.extend_from_slice(&self.azimuth_start.to_le_bytes());
        out.extend_from_slice(&self.azimuth_end.to_le_bytes());
        out.extend_from_slice(&self.range_start.to_le_bytes());
        out.extend_from_slice(&self.range_delta.to_le_bytes());
        out.extend_from_slice(&self.sample_count.to_le_bytes());
    }
}

/// Decoded radial ray, ready to be written into a texture row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayRecord {
    /// Product this ray belongs to
    pub product: Product,
    /// Degrees
    pub elevation_start: f32,
    pub elevation_end: f32,
    pub azimuth_start: f32,
    pub azimuth_end: f32,
    /// Kilometres
    pub range_start: f32,
    pub range_end: f32,
    /// Edge points: start edge (near, far) then end edge (near, far)
    pub points: [Vec3; 4],
    /// Sample magnitudes, at most [`MAX_RAY_SAMPLES`]
    pub values: Vec<u8>,
    /// First ray of a new sweep; the renderer should clear before drawing
    pub clear: bool,
    /// Ray counter from the flag byte
    pub counter: u8,
    /// Sweep counter from the flag byte
    pub sweep: u8,
    /// Decode sequence number within the session
    pub tic: u64,
}

impl RayRecord {
    /// Build a record from a parsed header and its sample bytes
    pub fn from_header(product: Product, header: &RayHeader, samples: &[u8], tic: u64) -> Self {
        let count = usize::from(header.sample_count);
        if samples.len() < count {
            warn!(
                "Ray carries {} samples but header claims {}",
                samples.len(),
                count
            );
        }
        let take = count.min(samples.len()).min(MAX_RAY_SAMPLES);
        let values = samples[..take].to_vec();

        let elevation_start = angle_from_i16(header.elevation_start);
        let elevation_end = angle_from_i16(header.elevation_end);
        let azimuth_start = angle_from_u16(header.azimuth_start);
        let azimuth_end = angle_from_u16(header.azimuth_end);
        let range_start = f32::from(header.range_start) * RANGE_SCALE_KM;
        let range_end =
            range_start + f32::from(header.sample_count) * f32::from(header.range_delta) * RANGE_SCALE_KM;

        let u = unit_vector(elevation_start, azimuth_start);
        let v = unit_vector(elevation_end, azimuth_end);
        let points = [
            scale(u, range_start),
            scale(u, range_end),
            scale(v, range_start),
            scale(v, range_end),
        ];

        Self {
            product,
            elevation_start,
            elevation_end,
            azimuth_start,
            azimuth_end,
            range_start,
            range_end,
            points,
            values,
            clear: false,
            counter: header.ray_counter(),
            sweep: header.sweep_counter(),
            tic,
        }
    }

    /// Short description with two-decimal angles, e.g. `E 2.40° A 45.00°`
    pub fn label(&self) -> String {
        format!("E {:.2}° A {:.2}°", self.elevation_start, self.azimuth_start)
    }
}

/// A detected gap in the ray counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaySkip {
    /// Counter value that should have arrived
    pub expected: u8,
    /// Counter value that did arrive
    pub got: u8,
}

/// Outcome of observing one ray's flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayObservation {
    /// Set when the ray counter did not advance by exactly one
    pub skip: Option<RaySkip>,
    /// Set when the sweep counter changed (or this is the first ray)
    pub new_sweep: bool,
}

/// Tracks the ray and sweep counters across consecutive rays
///
/// A skip is a diagnostic, never an error: the ray is still delivered.
#[derive(Debug, Clone, Default)]
pub struct RayCounter {
    last_ray: Option<u8>,
    last_sweep: Option<u8>,
    skips: u64,
}

impl RayCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the next flag byte
    pub fn observe(&mut self, flag: u8) -> RayObservation {
        let ray = flag & 0x3F;
        let sweep = flag >> 6;

        let skip = match self.last_ray {
            Some(last) => {
                let expected = (last + 1) % RAY_COUNTER_MODULUS;
                (ray != expected).then_some(RaySkip { expected, got: ray })
            }
            None => None,
        };
        if skip.is_some() {
            self.skips += 1;
        }
        let new_sweep = self.last_sweep != Some(sweep);

        self.last_ray = Some(ray);
        self.last_sweep = Some(sweep);
        RayObservation { skip, new_sweep }
    }

    /// Total skips observed
    pub fn skips(&self) -> u64 {
        self.skips
    }

    /// Forget history (e.g. after a reconnect)
    pub fn reset(&mut self) {
        self.last_ray = None;
        self.last_sweep = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_counters() {
        let flag = RayHeader::make_flag(63, 2);
        let header = RayHeader {
            flag,
            ..Default::default()
        };
        assert_eq!(header.ray_counter(), 63);
        assert_eq!(header.sweep_counter(), 2);
    }

    #[test]
    fn test_header_parse_incomplete() {
        let err = RayHeader::parse(&[0u8; 10]).unwrap_err();
        assert_eq!(err, ParseError::Incomplete { needed: 5 });
    }

    #[test]
    fn test_skip_detected_once() {
        let mut counter = RayCounter::new();
        let skips: Vec<_> = [0u8, 1, 2, 5]
            .into_iter()
            .filter_map(|c| counter.observe(c).skip)
            .collect();
        assert_eq!(skips, vec![RaySkip { expected: 3, got: 5 }]);
        assert_eq!(counter.skips(), 1);
    }

    #[test]
    fn test_counter_wraps_without_skip() {
        let mut counter = RayCounter::new();
        assert!(counter.observe(62).skip.is_none());
        assert!(counter.observe(63).skip.is_none());
        assert!(counter.observe(0).skip.is_none());
    }

    #[test]
    fn test_new_sweep_on_counter_change() {
        let mut counter = RayCounter::new();
        assert!(counter.observe(RayHeader::make_flag(0, 0)).new_sweep);
        assert!(!counter.observe(RayHeader::make_flag(1, 0)).new_sweep);
        assert!(counter.observe(RayHeader::make_flag(2, 1)).new_sweep);
    }

    #[test]
    fn test_record_range_and_points() {
        let header = RayHeader {
            flag: 0,
            elevation_start: 0,
            elevation_end: 0,
            azimuth_start: 0,
            azimuth_end: azimuth_to_raw(90.0),
            range_start: 1000,
            range_delta: 30,
            sample_count: 100,
        };
        let ray = RayRecord::from_header(Product::Z, &header, &[7u8; 100], 0);
        assert!((ray.range_start - 1.0).abs() < 1e-6);
        assert!((ray.range_end - 4.0).abs() < 1e-5);
        // Start edge points north, end edge points east
        assert!((ray.points[1][1] - 4.0).abs() < 1e-4);
        assert!((ray.points[3][0] - 4.0).abs() < 1e-4);
        assert_eq!(ray.values.len(), 100);
    }

    #[test]
    fn test_values_capped() {
        let header = RayHeader {
            sample_count: 600,
            range_delta: 1,
            ..Default::default()
        };
        let ray = RayRecord::from_header(Product::V, &header, &[1u8; 600], 3);
        assert_eq!(ray.values.len(), MAX_RAY_SAMPLES);
        assert_eq!(ray.tic, 3);
    }

    #[test]
    fn test_label_precision() {
        let header = RayHeader {
            elevation_start: elevation_to_raw(2.4),
            azimuth_start: azimuth_to_raw(45.0),
            ..Default::default()
        };
        let ray = RayRecord::from_header(Product::Z, &header, &[], 0);
        assert_eq!(ray.label(), "E 2.40° A 45.00°");
    }
}
