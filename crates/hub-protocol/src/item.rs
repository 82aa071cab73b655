//! Archive item names
//!
//! ```text
//! [prefix-]YYYYMMDD-HHMMSS-<scan>-<symbol>[.ext]
//! ```
//!
//! e.g. `PX-20220315-184500-E4.0-Z.nc`. Names are parsed from the right so a
//! radar prefix (which may itself contain dashes) is tolerated. The scan part
//! may contain dots (`E4.0`), so the extension is only split off the symbol.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::Product;

/// Parsed archive item name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemName {
    pub prefix: Option<String>,
    /// `YYYYMMDD`
    pub day: String,
    /// `HHMMSS`
    pub time: String,
    /// Scan identifier, e.g. `E4.0` (PPI) or `A45.0` (RHI)
    pub scan: String,
    /// Product symbol, usually one of [`Product::RING`]
    pub symbol: String,
    pub extension: Option<String>,
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

impl ItemName {
    pub fn parse(name: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidItemName(name.to_string());

        let mut parts = name.rsplitn(4, '-');
        let last = parts.next().ok_or_else(invalid)?;
        let scan = parts.next().ok_or_else(invalid)?;
        let time = parts.next().ok_or_else(invalid)?;
        let rest = parts.next().ok_or_else(invalid)?;
        let (prefix, day) = match rest.rsplit_once('-') {
            Some((p, d)) => (Some(p.to_string()), d),
            None => (None, rest),
        };
        let (symbol, extension) = match last.split_once('.') {
            Some((s, e)) => (s, Some(e.to_string())),
            None => (last, None),
        };

        if !all_digits(day, 8) || !all_digits(time, 6) || scan.is_empty() || symbol.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            prefix,
            day: day.to_string(),
            time: time.to_string(),
            scan: scan.to_string(),
            symbol: symbol.to_string(),
            extension,
        })
    }

    /// Product for the symbol, if it is a known one
    pub fn product(&self) -> Option<Product> {
        let mut chars = self.symbol.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Product::from_symbol(c),
            _ => None,
        }
    }

    /// Hour of day (0-23)
    pub fn hour(&self) -> u32 {
        self.time[..2].parse().unwrap_or(0)
    }

    /// `YYYYMMDD-HH00`, the key of the hourly list this item belongs to
    pub fn date_time_string(&self) -> String {
        format!("{}-{}00", self.day, &self.time[..2])
    }

    /// `YYYY/MM/DD HH:MM:SS UTC`
    pub fn time_string(&self) -> String {
        format!(
            "{}/{}/{} {}:{}:{} UTC",
            &self.day[0..4],
            &self.day[4..6],
            &self.day[6..8],
            &self.time[0..2],
            &self.time[2..4],
            &self.time[4..6]
        )
    }

    /// Range-height (RHI) scans start with `A`
    pub fn is_rhi(&self) -> bool {
        self.scan.starts_with('A')
    }

    /// Same item with a different product symbol
    pub fn with_symbol(&self, symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}-")?;
        }
        write!(f, "{}-{}-{}-{}", self.day, self.time, self.scan, self.symbol)?;
        if let Some(ext) = &self.extension {
            write!(f, ".{ext}")?;
        }
        Ok(())
    }
}

impl FromStr for ItemName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name() {
        let item = ItemName::parse("20220315-184512-E4.0-Z").unwrap();
        assert_eq!(item.prefix, None);
        assert_eq!(item.day, "20220315");
        assert_eq!(item.scan, "E4.0");
        assert_eq!(item.product(), Some(Product::Z));
        assert_eq!(item.hour(), 18);
        assert_eq!(item.date_time_string(), "20220315-1800");
        assert_eq!(item.time_string(), "2022/03/15 18:45:12 UTC");
        assert!(!item.is_rhi());
    }

    #[test]
    fn test_prefix_and_extension() {
        let item = ItemName::parse("RAXPOL-X-20220315-184512-A45.0-V.nc").unwrap();
        assert_eq!(item.prefix.as_deref(), Some("RAXPOL-X"));
        assert_eq!(item.symbol, "V");
        assert_eq!(item.extension.as_deref(), Some("nc"));
        assert!(item.is_rhi());
        assert_eq!(item.to_string(), "RAXPOL-X-20220315-184512-A45.0-V.nc");
    }

    #[test]
    fn test_with_symbol_keeps_rest() {
        let item = ItemName::parse("PX-20220315-184512-E2.0-Z.nc").unwrap();
        assert_eq!(item.with_symbol("D").to_string(), "PX-20220315-184512-E2.0-D.nc");
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Z", "2022-184512-E4.0-Z", "20220315-18451-E4.0-Z", "20220315-184512--Z"] {
            assert!(ItemName::parse(name).is_err(), "{name} should not parse");
        }
    }
}
