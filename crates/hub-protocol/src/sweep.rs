//! Archived sweep codec and geometry
//!
//! # Binary Format (little-endian)
//! ```text
//! u16 nb, u16 nr, u16 nx, u16 reserved
//! f64 time, f64 longitude, f64 latitude, f64 reserved
//! f32 scanElevation, f32 scanAzimuth, f32 rangeStart, f32 rangeSpacing
//! u8[nx]     info (JSON text)
//! f32[nb]    elevations
//! f32[nb]    azimuths
//! u8[nb*nr]  values
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ParseError;
use crate::geometry::{scale, unit_vector, Vec3};
use crate::item::ItemName;

/// Size of the fixed header
pub const SWEEP_HEADER_LEN: usize = 56;

/// Sweep fields exactly as stored on the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSweep {
    /// Gates per ray
    pub nr: usize,
    /// Seconds since the epoch
    pub time: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub scan_elevation: f32,
    pub scan_azimuth: f32,
    pub range_start: f32,
    pub range_spacing: f32,
    pub info: String,
    /// One entry per ray
    pub elevations: Vec<f32>,
    pub azimuths: Vec<f32>,
    /// `nb * nr` values, ray-major
    pub values: Vec<u8>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(ParseError::Incomplete {
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn f32(&mut self) -> Result<f32, ParseError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, ParseError> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(f64::from_le_bytes(a))
    }

    fn f32s(&mut self, n: usize) -> Result<Vec<f32>, ParseError> {
        (0..n).map(|_| self.f32()).collect()
    }
}

impl RawSweep {
    /// Number of rays
    pub fn nb(&self) -> usize {
        self.elevations.len()
    }

    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut r = Reader { data, pos: 0 };
        let nb = usize::from(r.u16()?);
        let nr = usize::from(r.u16()?);
        let nx = usize::from(r.u16()?);
        r.u16()?;
        let time = r.f64()?;
        let longitude = r.f64()?;
        let latitude = r.f64()?;
        r.f64()?;
        let scan_elevation = r.f32()?;
        let scan_azimuth = r.f32()?;
        let range_start = r.f32()?;
        let range_spacing = r.f32()?;
        let info = std::str::from_utf8(r.take(nx)?)?.to_string();
        let elevations = r.f32s(nb)?;
        let azimuths = r.f32s(nb)?;
        let values = r.take(nb * nr)?.to_vec();

        Ok(Self {
            nr,
            time,
            longitude,
            latitude,
            scan_elevation,
            scan_azimuth,
            range_start,
            range_spacing,
            info,
            elevations,
            azimuths,
            values,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let nb = self.nb();
        let mut out = Vec::with_capacity(SWEEP_HEADER_LEN + self.info.len() + nb * 8 + self.values.len());
        for v in [nb as u16, self.nr as u16, self.info.len() as u16, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [self.time, self.longitude, self.latitude, 0.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [
            self.scan_elevation,
            self.scan_azimuth,
            self.range_start,
            self.range_spacing,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(self.info.as_bytes());
        for v in self.elevations.iter().chain(self.azimuths.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.values);
        out
    }
}

/// Triangle mesh of a sweep, ready for a renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepGeometry {
    /// Ray angles with one padded ray appended (`nb + 1` entries)
    pub elevations: Vec<f32>,
    pub azimuths: Vec<f32>,
    /// Near and far point of every padded ray, `(nb + 1) * 2` entries
    pub points: Vec<Vec3>,
    /// Texture coordinate of every point
    pub origins: Vec<[f32; 2]>,
    /// Two triangles per ray
    pub elements: Vec<[u32; 3]>,
}

impl SweepGeometry {
    /// Build the mesh. `scan` selects how the padding ray is extrapolated:
    /// `E...` (PPI) steps in azimuth, `A...` (RHI) steps in elevation, and
    /// anything else steps in both.
    pub fn build(raw: &RawSweep, scan: &str) -> Self {
        let nb = raw.nb();
        let mut elevations = raw.elevations.clone();
        let mut azimuths = raw.azimuths.clone();
        if nb == 0 {
            return Self::default();
        }

        let ii = (nb / 2).min(nb - 1);
        let (da, de) = if ii > 0 {
            (
                azimuths[ii] - azimuths[ii - 1],
                elevations[ii] - elevations[ii - 1],
            )
        } else {
            (0.0, 0.0)
        };
        let (el_last, az_last) = (elevations[nb - 1], azimuths[nb - 1]);
        let (el_pad, az_pad) = match scan.chars().next() {
            Some('E') => (el_last, az_last + da),
            Some('A') => (el_last + de, az_last),
            _ => (el_last + de, az_last + da),
        };
        elevations.push(el_pad);
        azimuths.push(az_pad);

        let rs = raw.range_start;
        let re = raw.range_start + raw.nr as f32 * raw.range_spacing;
        let mut points = Vec::with_capacity((nb + 1) * 2);
        let mut origins = Vec::with_capacity((nb + 1) * 2);
        for k in 0..=nb {
            let u = unit_vector(elevations[k], azimuths[k]);
            let v = k as f32 / nb as f32;
            points.push(scale(u, rs));
            points.push(scale(u, re));
            origins.push([0.0, v]);
            origins.push([1.0, v]);
        }

        let elements = (1..=nb as u32)
            .flat_map(|k| {
                let o = 2 * k;
                [[o - 2, o - 1, o], [o - 1, o, o + 1]]
            })
            .collect();

        Self {
            elevations,
            azimuths,
            points,
            origins,
            elements,
        }
    }
}

/// A decoded archived sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    /// Item name the sweep was loaded from
    pub name: String,
    pub scan: String,
    pub symbol: String,
    pub is_rhi: bool,
    /// `YYYY/MM/DD HH:MM:SS UTC`
    pub time_string: String,
    /// Time plus the fixed angle, e.g. `... UTC   El 4.0°`
    pub title_string: String,
    /// Summary of the info block, empty when it is not JSON
    pub info_string: String,
    pub raw: RawSweep,
    pub geometry: SweepGeometry,
}

impl Sweep {
    /// Decode a sweep loaded for `name`
    ///
    /// Sweeps with no rays or no gates are rejected.
    pub fn decode(name: &str, data: &[u8]) -> Result<Self, ParseError> {
        let item = ItemName::parse(name)?;
        let raw = RawSweep::parse(data)?;
        if raw.nb() == 0 || raw.nr == 0 {
            return Err(ParseError::InvalidSweep(format!("{name} has no data")));
        }
        Ok(Self::assemble(name, &item, raw))
    }

    fn assemble(name: &str, item: &ItemName, raw: RawSweep) -> Self {
        let is_rhi = item.is_rhi();
        let time_string = item.time_string();
        let angle = if is_rhi {
            format!("Az {:.1}", raw.scan_azimuth)
        } else {
            format!("El {:.1}", raw.scan_elevation)
        };
        let title_string = format!("{time_string}   {angle}°");
        let info_string = match serde_json::from_str::<serde_json::Value>(&raw.info) {
            Ok(info) => {
                let field = |key: &str| match &info[key] {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("Gatewidth: {} m\nWaveform: {}", field("gatewidth"), field("waveform"))
            }
            Err(e) => {
                debug!("Sweep {} info is not JSON: {}", name, e);
                String::new()
            }
        };
        let geometry = SweepGeometry::build(&raw, &item.scan);

        Self {
            name: name.to_string(),
            scan: item.scan.clone(),
            symbol: item.symbol.clone(),
            is_rhi,
            time_string,
            title_string,
            info_string,
            raw,
            geometry,
        }
    }

    pub fn nb(&self) -> usize {
        self.raw.nb()
    }

    pub fn nr(&self) -> usize {
        self.raw.nr
    }
}
