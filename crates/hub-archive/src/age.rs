//! Coarse "how long ago" strings for listed items

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use hub_protocol::ItemName;

/// Ages past this many days are not shown
pub const MAX_AGE_DAYS: i64 = 14;

fn plural(n: i64, unit: &str) -> String {
    format!("> {} {}{} ago", n, unit, if n > 1 { "s" } else { "" })
}

/// Human string for an elapsed time; empty beyond [`MAX_AGE_DAYS`]
pub fn age_string(elapsed: TimeDelta) -> String {
    if elapsed < TimeDelta::minutes(1) {
        "< 1 minute ago".to_string()
    } else if elapsed < TimeDelta::hours(1) {
        plural(elapsed.num_minutes(), "minute")
    } else if elapsed < TimeDelta::days(1) {
        plural(elapsed.num_hours(), "hour")
    } else if elapsed <= TimeDelta::days(MAX_AGE_DAYS) {
        plural(elapsed.num_days(), "day")
    } else {
        String::new()
    }
}

/// Timestamp encoded in an item name
pub fn item_time(item: &str) -> Option<DateTime<Utc>> {
    let name = ItemName::parse(item).ok()?;
    let stamp = format!("{}{}", name.day, name.time);
    NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S")
        .ok()
        .map(|t| t.and_utc())
}

/// Age strings of the items on screen, recomputed on a timer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ages {
    strings: Vec<String>,
}

impl Ages {
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Recompute for `items`; true only if some displayed text changed
    pub fn update<'a>(&mut self, items: impl IntoIterator<Item = &'a str>, now: DateTime<Utc>) -> bool {
        let fresh: Vec<String> = items
            .into_iter()
            .map(|item| item_time(item).map_or_else(String::new, |t| age_string(now - t)))
            .collect();
        if fresh == self.strings {
            return false;
        }
        self.strings = fresh;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_age_strings() {
        assert_eq!(age_string(TimeDelta::seconds(59)), "< 1 minute ago");
        assert_eq!(age_string(TimeDelta::seconds(-5)), "< 1 minute ago");
        assert_eq!(age_string(TimeDelta::minutes(1)), "> 1 minute ago");
        assert_eq!(age_string(TimeDelta::minutes(59)), "> 59 minutes ago");
        assert_eq!(age_string(TimeDelta::minutes(61)), "> 1 hour ago");
        assert_eq!(age_string(TimeDelta::hours(5)), "> 5 hours ago");
        assert_eq!(age_string(TimeDelta::hours(30)), "> 1 day ago");
        assert_eq!(age_string(TimeDelta::days(14)), "> 14 days ago");
        assert_eq!(age_string(TimeDelta::days(15)), "");
    }

    #[test]
    fn test_item_time() {
        let t = item_time("PX-20220315-184500-E4.0-Z.nc").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2022, 3, 15, 18, 45, 0).unwrap());
        assert_eq!(item_time("garbage"), None);
    }

    #[test]
    fn test_update_reports_only_text_changes() {
        let items = ["20220315-184500-E4.0-Z"];
        let t0 = Utc.with_ymd_and_hms(2022, 3, 15, 18, 50, 0).unwrap();
        let mut ages = Ages::default();
        assert!(ages.update(items, t0));
        assert_eq!(ages.strings(), ["> 5 minutes ago"]);
        // Same minute bucket a second later
        assert!(!ages.update(items, t0 + TimeDelta::seconds(1)));
        assert!(ages.update(items, t0 + TimeDelta::minutes(1)));
    }
}
