//! Archive grid: the materialized window of the remote catalog
//!
//! The grid holds the items of (at most) two consecutive hours, the selected
//! index into them, and the calendar coverage used for badges. The worker owns
//! the authoritative copy and sends snapshots; the engine keeps the latest
//! accepted snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use hub_protocol::{ItemName, Product};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{CatchupPayload, ListPayload};
use crate::error::ArchiveError;
use crate::mode::{ListMode, LiveUpdate};

/// Entries of `years_active`
pub const YEARS_LEN: usize = 200;

/// Position of the catchup payload's years inside `years_active`
pub const YEARS_OFFSET: usize = 100;

/// `paths_active` slots
pub const PATH_BACKWARD_SCAN: usize = 0;
pub const PATH_BACKWARD: usize = 1;
pub const PATH_FORWARD: usize = 2;
pub const PATH_FORWARD_SCAN: usize = 3;

const DATE_TIME_FORMAT: &str = "%Y%m%d-%H%M";

/// Windowed view of the archive catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// `YYYYMMDD-HH00` of the hour the window is anchored at
    pub date_time_string: String,
    /// `YYYYMMDD` to coverage bucket (0-4)
    pub days_active: BTreeMap<String, u8>,
    /// Items per hour of the anchor day
    pub hours_active: Vec<u32>,
    pub years_active: Vec<u32>,
    /// Which of backward-scan, backward, forward, forward-scan can move
    pub paths_active: [bool; 4],
    pub latest_scan: String,
    /// Last hour of the anchor day with data
    pub latest_hour: Option<u32>,
    pub list_mode: ListMode,
    /// Items before the anchor hour, items in it
    pub counts: [usize; 2],
    pub items: Vec<String>,
    /// Scan to indices of its items, in list order
    pub items_grouped: BTreeMap<String, Vec<usize>>,
    pub hour: Option<u32>,
    pub index: Option<usize>,
    pub symbol: Product,
    /// Scan of the selected item
    pub scan: String,
    /// The catalog has items before the window
    pub more_before: bool,
    /// The catalog has items after the window
    pub more_after: bool,
    /// Bumped on every accepted update
    pub tic: u64,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            date_time_string: "20130520-1900".to_string(),
            days_active: BTreeMap::new(),
            hours_active: vec![0; 24],
            years_active: vec![0; YEARS_LEN],
            paths_active: [false; 4],
            latest_scan: String::new(),
            latest_hour: None,
            list_mode: ListMode::default(),
            counts: [0, 0],
            items: Vec::new(),
            items_grouped: BTreeMap::new(),
            hour: None,
            index: None,
            symbol: Product::Z,
            scan: "E4.0".to_string(),
            more_before: false,
            more_after: false,
            tic: 0,
        }
    }
}

/// Last hour with a non-zero count
pub fn latest_hour_of(hours_active: &[u32]) -> Option<u32> {
    hours_active
        .iter()
        .rposition(|&count| count > 0)
        .and_then(|h| u32::try_from(h).ok())
}

fn scan_of(item: &str) -> Option<String> {
    match ItemName::parse(item) {
        Ok(name) => Some(name.scan),
        Err(e) => {
            warn!("Skipping item: {}", e);
            None
        }
    }
}

fn hour_from(value: i32) -> Option<u32> {
    u32::try_from(value).ok()
}

impl Grid {
    /// Per-hour availability for the hour picker
    pub fn hour_has_data(&self) -> [bool; 24] {
        let mut out = [false; 24];
        for (slot, &count) in out.iter_mut().zip(&self.hours_active) {
            *slot = count > 0;
        }
        out
    }

    /// Anchor hour as a date-time, if the anchor string is well formed
    pub fn date_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date_time_string, DATE_TIME_FORMAT).ok()
    }

    /// Rebuild `items_grouped` from `items`
    pub fn regroup(&mut self) {
        self.items_grouped.clear();
        for (index, item) in self.items.iter().enumerate() {
            if let Some(scan) = scan_of(item) {
                self.items_grouped.entry(scan).or_default().push(index);
            }
        }
    }

    /// Last item of `scan`
    pub fn last_in_scan(&self, scan: &str) -> Option<usize> {
        self.items_grouped
            .get(scan)
            .and_then(|group| group.last().copied())
    }

    /// Where a fresh list should land: the newest item of the current scan,
    /// else the newest item
    pub fn default_index(&self) -> Option<usize> {
        self.last_in_scan(&self.scan)
            .or_else(|| self.items.len().checked_sub(1))
    }

    fn derive_more(&mut self, first_hour: Option<u32>) {
        let Some(hour) = self.hour else {
            self.more_before = false;
            self.more_after = false;
            return;
        };
        let first = first_hour.unwrap_or(hour) as usize;
        let last = hour as usize + 1;
        self.more_before = self.hours_active.iter().take(first).any(|&c| c > 0);
        self.more_after = self.hours_active.iter().skip(last).any(|&c| c > 0);
    }

    /// Replace the window with a list response
    pub fn apply_list(
        &mut self,
        date_time_string: String,
        symbol: Product,
        mode: ListMode,
        payload: ListPayload,
    ) {
        self.hour = hour_from(payload.hour);
        self.index = None;
        self.symbol = symbol;
        self.latest_hour = latest_hour_of(&payload.hours_active);
        self.hours_active = payload.hours_active;
        self.date_time_string = date_time_string;
        self.list_mode = mode;
        self.counts = payload.counts;
        self.items = payload.items;
        self.regroup();

        let first_hour = self
            .hour
            .map(|h| if self.counts[0] > 0 { h.saturating_sub(1) } else { h });
        self.derive_more(first_hour);
        if let Some(more) = payload.more_before {
            self.more_before = more;
        }
        if let Some(more) = payload.more_after {
            self.more_after = more;
        }
        debug!(
            "List {} has {} items [{}, {}] more {}/{}",
            self.date_time_string,
            self.items.len(),
            self.counts[0],
            self.counts[1],
            self.more_before,
            self.more_after
        );
    }

    /// Same hour, different product: rename every item in place
    ///
    /// Returns the index that was selected; the selection itself is cleared
    /// so selecting it again reloads the sweep.
    pub fn swap_symbol(&mut self, symbol: Product, mode: ListMode) -> Option<usize> {
        let previous = self.index.take();
        let letter = symbol.to_string();
        for item in self.items.iter_mut() {
            match ItemName::parse(item) {
                Ok(name) => *item = name.with_symbol(&letter).to_string(),
                Err(e) => warn!("Cannot rename item: {}", e),
            }
        }
        self.symbol = symbol;
        self.list_mode = mode;
        self.regroup();
        previous
    }

    /// Replace the window with the latest data
    pub fn apply_catchup(&mut self, payload: CatchupPayload) {
        self.date_time_string = payload.date_time_string;
        self.hours_active = payload.hours_active;
        self.days_active = payload.days_active;
        self.latest_scan = payload.latest_scan;
        self.hour = hour_from(payload.hour);
        self.latest_hour = self.hour;
        self.items = payload.items;
        self.index = None;
        self.list_mode = ListMode::Catchup;
        self.counts = [0, self.items.len()];
        self.regroup();
        for (k, count) in payload.years_active.into_iter().enumerate() {
            if let Some(slot) = self.years_active.get_mut(YEARS_OFFSET + k) {
                *slot = count;
            }
        }
        self.derive_more(None);
        self.more_after = false;
    }

    /// Merge month coverage; days already known keep their value
    pub fn merge_days(&mut self, days: BTreeMap<String, u8>) {
        for (day, bucket) in days {
            self.days_active.entry(day).or_insert(bucket);
        }
    }

    /// Select `index`
    ///
    /// Returns the item to load, or `None` when it is already selected.
    pub fn set_index(&mut self, index: usize) -> Result<Option<String>, ArchiveError> {
        let Some(item) = self.items.get(index).cloned() else {
            return Err(ArchiveError::IndexOutOfRange {
                index: index as isize,
                len: self.items.len(),
            });
        };
        if self.index == Some(index) {
            return Ok(None);
        }
        self.index = Some(index);
        self.revise_paths();
        Ok(Some(item))
    }

    /// Recompute `paths_active` (and `scan`) for the selected item
    pub fn revise_paths(&mut self) {
        if self.items.is_empty() {
            self.paths_active = [false; 4];
            return;
        }
        let Some(index) = self.index.filter(|&i| i < self.items.len()) else {
            return;
        };
        let Some(scan) = scan_of(&self.items[index]) else {
            return;
        };
        let group = self.items_grouped.get(&scan).map(Vec::as_slice).unwrap_or(&[]);
        let last = self.items.len() - 1;
        self.paths_active[PATH_BACKWARD_SCAN] = group.first() != Some(&index);
        self.paths_active[PATH_BACKWARD] = index != 0;
        self.paths_active[PATH_FORWARD] = index != last;
        self.paths_active[PATH_FORWARD_SCAN] = group.last() != Some(&index);
        self.scan = scan;
    }

    /// Index one item away, clamped to the window
    pub fn step(&self, delta: isize) -> Option<usize> {
        let last = self.items.len().checked_sub(1)?;
        let current = self.index.map_or(-1, |i| i as isize);
        Some((current + delta).clamp(0, last as isize) as usize)
    }

    /// Index one item of the same scan away, clamped to that scan's items
    pub fn scan_step(&self, delta: isize) -> Option<usize> {
        let group = self.items_grouped.get(&self.scan)?;
        let last = group.len().checked_sub(1)?;
        let k = self
            .index
            .and_then(|i| group.iter().position(|&g| g == i))
            .map_or(-1, |k| k as isize);
        Some(group[(k + delta).clamp(0, last as isize) as usize])
    }

    /// Add an item pushed by the live feed
    ///
    /// Items of another product are ignored; an item from a new hour starts a
    /// new list. Returns the index to select under `update`.
    pub fn add_live_item(&mut self, item: &str, update: Option<LiveUpdate>) -> Option<usize> {
        let name = match ItemName::parse(item) {
            Ok(name) => name,
            Err(e) => {
                warn!("Ignoring live item: {}", e);
                return None;
            }
        };
        if name.product() != Some(self.symbol) {
            return None;
        }
        let date_time_string = name.date_time_string();
        if self.date_time_string != date_time_string {
            debug!("Live item starts hour {}", date_time_string);
            self.date_time_string = date_time_string;
            self.items.clear();
            self.items_grouped.clear();
            self.index = None;
            self.counts = [0, 0];
            self.hour = Some(name.hour());
        }
        if self.items.iter().any(|i| i == item) {
            warn!("Item {} exists", item);
            return None;
        }
        let index = self.items.len();
        self.items.push(item.to_string());
        self.items_grouped.entry(name.scan).or_default().push(index);
        self.counts[1] = self.items.len() - self.counts[0];
        self.list_mode = ListMode::Catchup;

        match update {
            Some(LiveUpdate::Always) => Some(index),
            _ => self.last_in_scan(&self.scan),
        }
    }

    /// The anchor hour is the current UTC hour and the selection is the
    /// newest item of its scan
    pub fn is_latest_volume_at(&self, now: DateTime<Utc>) -> bool {
        if self.date_time_string != now.format("%Y%m%d-%H00").to_string() {
            return false;
        }
        match self.index {
            Some(index) => self.last_in_scan(&self.scan) == Some(index),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn items() -> Vec<String> {
        [
            "20220315-180000-E2.0-Z",
            "20220315-180100-E4.0-Z",
            "20220315-180500-E2.0-Z",
            "20220315-180600-E4.0-Z",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn grid() -> Grid {
        let mut grid = Grid {
            date_time_string: "20220315-1800".into(),
            items: items(),
            hour: Some(18),
            ..Default::default()
        };
        grid.regroup();
        grid
    }

    #[test]
    fn test_defaults() {
        let grid = Grid::default();
        assert_eq!(grid.date_time_string, "20130520-1900");
        assert_eq!(grid.scan, "E4.0");
        assert_eq!(grid.index, None);
        assert_eq!(grid.years_active.len(), YEARS_LEN);
        assert_eq!(grid.hour_has_data(), [false; 24]);
    }

    #[test]
    fn test_grouping_and_default_index() {
        let grid = grid();
        assert_eq!(grid.items_grouped["E2.0"], vec![0, 2]);
        assert_eq!(grid.items_grouped["E4.0"], vec![1, 3]);
        assert_eq!(grid.default_index(), Some(3));

        let other = Grid {
            scan: "A45.0".into(),
            ..grid
        };
        assert_eq!(other.default_index(), Some(3));
    }

    #[test]
    fn test_paths_active() {
        let mut grid = grid();
        assert_eq!(grid.set_index(1).unwrap().as_deref(), Some("20220315-180100-E4.0-Z"));
        assert_eq!(grid.paths_active, [false, true, true, true]);
        grid.set_index(3).unwrap();
        assert_eq!(grid.paths_active, [true, true, false, false]);
        grid.set_index(0).unwrap();
        assert_eq!(grid.scan, "E2.0");
        assert_eq!(grid.paths_active, [false, false, true, true]);
    }

    #[test]
    fn test_set_index_bounds_and_repeat() {
        let mut grid = grid();
        assert!(matches!(
            grid.set_index(4),
            Err(ArchiveError::IndexOutOfRange { index: 4, len: 4 })
        ));
        assert_eq!(grid.index, None);
        grid.set_index(2).unwrap();
        assert_eq!(grid.set_index(2).unwrap(), None);
    }

    #[test]
    fn test_step_and_scan_step() {
        let mut grid = grid();
        assert_eq!(grid.step(1), Some(0));
        grid.set_index(1).unwrap();
        assert_eq!(grid.step(-1), Some(0));
        assert_eq!(grid.step(5), Some(3));
        assert_eq!(grid.scan_step(1), Some(3));
        assert_eq!(grid.scan_step(-1), Some(1));
        assert_eq!(Grid::default().step(1), None);
    }

    #[test]
    fn test_swap_symbol_keeps_positions() {
        let mut grid = grid();
        grid.set_index(2).unwrap();
        let previous = grid.swap_symbol(Product::V, ListMode::Select);
        assert_eq!(previous, Some(2));
        assert_eq!(grid.index, None);
        assert_eq!(grid.items[2], "20220315-180500-E2.0-V");
        assert_eq!(grid.symbol, Product::V);
    }

    #[test]
    fn test_merge_days_keeps_existing() {
        let mut grid = Grid::default();
        grid.days_active.insert("20220301".into(), 4);
        grid.merge_days(
            [("20220301".to_string(), 1), ("20220302".to_string(), 2)]
                .into_iter()
                .collect(),
        );
        assert_eq!(grid.days_active["20220301"], 4);
        assert_eq!(grid.days_active["20220302"], 2);
    }

    #[test]
    fn test_live_item_rules() {
        let mut grid = grid();
        grid.set_index(3).unwrap();

        // Other product
        assert_eq!(grid.add_live_item("20220315-181000-E4.0-V", Some(LiveUpdate::Always)), None);
        // Duplicate
        assert_eq!(grid.add_live_item("20220315-180600-E4.0-Z", Some(LiveUpdate::Always)), None);
        assert_eq!(grid.items.len(), 4);

        // Scan mode follows the scan being viewed
        assert_eq!(grid.add_live_item("20220315-181000-E2.0-Z", Some(LiveUpdate::Scan)), Some(3));
        assert_eq!(grid.add_live_item("20220315-181100-E4.0-Z", Some(LiveUpdate::Scan)), Some(5));
        // Always follows everything
        assert_eq!(grid.add_live_item("20220315-181500-E2.0-Z", Some(LiveUpdate::Always)), Some(6));

        // New hour resets the list
        assert_eq!(grid.add_live_item("20220315-190000-E4.0-Z", Some(LiveUpdate::Scan)), Some(0));
        assert_eq!(grid.items.len(), 1);
        assert_eq!(grid.date_time_string, "20220315-1900");
        assert_eq!(grid.hour, Some(19));
    }

    #[test]
    fn test_is_latest_volume() {
        let mut grid = grid();
        let now = Utc.with_ymd_and_hms(2022, 3, 15, 18, 42, 0).unwrap();
        grid.set_index(3).unwrap();
        assert!(grid.is_latest_volume_at(now));
        grid.set_index(1).unwrap();
        assert!(!grid.is_latest_volume_at(now));
        grid.set_index(3).unwrap();
        let later = Utc.with_ymd_and_hms(2022, 3, 15, 19, 0, 0).unwrap();
        assert!(!grid.is_latest_volume_at(later));
    }

    #[test]
    fn test_apply_list_derives_more() {
        let mut grid = Grid::default();
        let mut hours_active = vec![0; 24];
        hours_active[16] = 3;
        hours_active[17] = 2;
        hours_active[18] = 2;
        hours_active[20] = 1;
        let payload = ListPayload {
            hour: 18,
            hours_active,
            counts: [2, 2],
            items: items(),
            more_before: None,
            more_after: None,
        };
        grid.apply_list("20220315-1800".into(), Product::Z, ListMode::Select, payload);
        assert_eq!(grid.latest_hour, Some(20));
        assert!(grid.more_before);
        assert!(grid.more_after);
        assert_eq!(grid.items_grouped.len(), 2);
        assert_eq!(grid.index, None);
    }
}
