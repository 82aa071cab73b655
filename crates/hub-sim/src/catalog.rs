//! In-memory archive catalog
//!
//! [`MemoryCatalog`] pretends to be an archive server. It holds a span of
//! volumes, one every `volume_minutes`, each made of one sweep per configured
//! scan a few seconds apart. Lists, month coverage and catchup payloads are
//! computed from that span; sweeps are synthesised on load. When the live
//! feed is open a new volume is appended every `feed_interval_ms`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use hub_archive::catalog::FEED_DEPTH;
use hub_archive::{
    ArchiveError, Catalog, CatchupPayload, FeedPayload, ListPayload, MonthPayload,
};
use hub_protocol::sweep::RawSweep;
use hub_protocol::{ItemName, Product};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

const ITEM_FORMAT: &str = "%Y%m%d-%H%M%S";
const LIST_FORMAT: &str = "%Y%m%d-%H%M";

/// First year of `years_active`
pub const YEARS_BASE: i32 = 2000;

/// Shape of the simulated archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCatalogConfig {
    /// Minutes between volumes
    pub volume_minutes: i64,
    /// Scans of every volume, in order
    pub scans: Vec<String>,
    /// Seconds between the scans of a volume
    pub scan_seconds: i64,
    /// Hours of history before the latest volume
    pub history_hours: i64,
    /// New volume cadence while a feed is open (ms); 0 keeps the span fixed
    pub feed_interval_ms: u64,
    /// Rays per synthesised sweep
    pub rays: usize,
    /// Gates per ray
    pub gates: usize,
    /// Gate spacing (km)
    pub gate_km: f32,
}

impl Default for MemoryCatalogConfig {
    fn default() -> Self {
        Self {
            volume_minutes: 5,
            scans: vec!["E2.0".into(), "E4.0".into(), "E6.0".into()],
            scan_seconds: 40,
            history_hours: 48,
            feed_interval_ms: 30_000,
            rays: 360,
            gates: 200,
            gate_km: 0.06,
        }
    }
}

#[derive(Debug)]
struct Span {
    first: NaiveDateTime,
    last: NaiveDateTime,
}

/// Archive catalog served from memory
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    config: Arc<MemoryCatalogConfig>,
    span: Arc<Mutex<Span>>,
}

fn not_found(text: String) -> ArchiveError {
    ArchiveError::Catalog { status: 404, text }
}

fn hour_start(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t)
}

fn month_days(day: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let first = day.with_day(1).unwrap_or(day);
    first
        .iter_days()
        .take_while(move |d| d.month() == first.month())
}

impl MemoryCatalog {
    /// Catalog whose latest volume is the last one before now
    pub fn new(config: MemoryCatalogConfig) -> Self {
        Self::ending_at(config, Utc::now())
    }

    /// Catalog whose latest volume is the last one at or before `latest`
    pub fn ending_at(config: MemoryCatalogConfig, latest: DateTime<Utc>) -> Self {
        let latest = latest.naive_utc().with_second(0).unwrap_or(latest.naive_utc());
        let step = config.volume_minutes.max(1);
        let minute = i64::from(latest.minute());
        let last = latest - TimeDelta::minutes(minute % step);
        let first = last - TimeDelta::hours(config.history_hours.max(0));
        info!("Memory catalog spans {} to {}", first, last);
        Self {
            config: Arc::new(config),
            span: Arc::new(Mutex::new(Span { first, last })),
        }
    }

    fn span(&self) -> (NaiveDateTime, NaiveDateTime) {
        let span = self.span.lock().unwrap_or_else(PoisonError::into_inner);
        (span.first, span.last)
    }

    /// Newest volume time
    pub fn latest(&self) -> NaiveDateTime {
        self.span().1
    }

    fn step(&self) -> TimeDelta {
        TimeDelta::minutes(self.config.volume_minutes.max(1))
    }

    fn scan_offset(&self, k: usize) -> TimeDelta {
        TimeDelta::seconds(self.config.scan_seconds * k as i64)
    }

    fn volume_items(&self, volume: NaiveDateTime, symbol: char) -> Vec<(NaiveDateTime, String)> {
        self.config
            .scans
            .iter()
            .enumerate()
            .map(|(k, scan)| {
                let t = volume + self.scan_offset(k);
                (t, format!("{}-{}-{}", t.format(ITEM_FORMAT), scan, symbol))
            })
            .collect()
    }

    /// Items timed within `[start, end)`
    fn items_between(&self, start: NaiveDateTime, end: NaiveDateTime, symbol: char) -> Vec<String> {
        let (first, last) = self.span();
        let step = self.step();
        // First volume that can have a sweep at or after `start`
        let reach = self.scan_offset(self.config.scans.len());
        let mut volume = if start - reach > first {
            let behind = (start - reach - first).num_minutes() / step.num_minutes();
            first + step * behind as i32
        } else {
            first
        };
        let mut items = Vec::new();
        while volume <= last && volume < end {
            items.extend(
                self.volume_items(volume, symbol)
                    .into_iter()
                    .filter(|(t, _)| *t >= start && *t < end)
                    .map(|(_, name)| name),
            );
            volume += step;
        }
        items
    }

    fn hours_active(&self, day: NaiveDate) -> Vec<u32> {
        let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
        (0..24)
            .map(|h| {
                let start = midnight + TimeDelta::hours(h);
                self.items_between(start, start + TimeDelta::hours(1), 'Z').len() as u32
            })
            .collect()
    }

    fn days_active(&self, day: NaiveDate) -> MonthPayload {
        month_days(day)
            .filter_map(|d| {
                let hours = self.hours_active(d).iter().filter(|&&n| n > 0).count();
                (hours > 0).then(|| {
                    let bucket = 1 + (hours - 1) * 4 / 24;
                    (d.format("%Y%m%d").to_string(), bucket as u8)
                })
            })
            .collect()
    }

    fn years_active(&self) -> Vec<u32> {
        let (first, last) = self.span();
        let mut years = vec![0u32; (last.year() - YEARS_BASE + 1).max(0) as usize];
        for day in first.date().iter_days().take_while(|d| *d <= last.date()) {
            if let Some(slot) = usize::try_from(day.year() - YEARS_BASE)
                .ok()
                .and_then(|k| years.get_mut(k))
            {
                *slot += 1;
            }
        }
        years
    }

    fn sweep(&self, item: &ItemName, time: NaiveDateTime) -> RawSweep {
        let angle: f32 = item.scan.get(1..).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let rhi = item.is_rhi();
        let nb = self.config.rays.max(1);
        let nr = self.config.gates.max(1);
        let sweep_angles: Vec<f32> = (0..nb).map(|k| k as f32 * 360.0 / nb as f32).collect();
        let (elevations, azimuths) = if rhi {
            let el = (0..nb).map(|k| k as f32 * 90.0 / nb as f32).collect();
            (el, vec![angle; nb])
        } else {
            (vec![angle; nb], sweep_angles)
        };
        let product = item.product().unwrap_or_default();
        let phase = time.minute() as f32 * 6.0 + product as u8 as f32 * 20.0;
        let values = (0..nb * nr)
            .map(|n| {
                let (ray, gate) = (n / nr, n % nr);
                let a = (ray as f32 * 360.0 / nb as f32 + phase).to_radians();
                let r = gate as f32 / nr as f32;
                let v = 128.0 + 100.0 * (2.0 * a).sin() * (9.0 * r).cos() * (1.0 - r);
                v.clamp(1.0, 255.0) as u8
            })
            .collect();
        RawSweep {
            nr,
            time: time.and_utc().timestamp() as f64,
            longitude: -97.422413,
            latitude: 35.181247,
            scan_elevation: if rhi { 0.0 } else { angle },
            scan_azimuth: if rhi { angle } else { 0.0 },
            range_start: 0.0,
            range_spacing: self.config.gate_km,
            info: serde_json::json!({
                "gatewidth": (self.config.gate_km * 1000.0).round(),
                "waveform": "s01",
            })
            .to_string(),
            elevations,
            azimuths,
            values,
        }
    }

    /// Append the next volume; returns its Z items
    fn grow(&self) -> (NaiveDateTime, Vec<String>) {
        let step = self.step();
        let latest = {
            let mut span = self.span.lock().unwrap_or_else(PoisonError::into_inner);
            span.last += step;
            span.last
        };
        let items = self
            .volume_items(latest, Product::Z.symbol())
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        (latest, items)
    }
}

impl Catalog for MemoryCatalog {
    async fn list(
        &self,
        pathway: &str,
        date_time: &str,
        symbol: char,
    ) -> Result<ListPayload, ArchiveError> {
        let anchor = NaiveDateTime::parse_from_str(date_time, LIST_FORMAT)
            .map_err(|_| ArchiveError::InvalidDay(date_time.to_string()))?;
        let anchor = hour_start(anchor);
        let hour = TimeDelta::hours(1);
        let before = self.items_between(anchor - hour, anchor, symbol);
        let during = self.items_between(anchor, anchor + hour, symbol);
        debug!(
            "List {} {} {}: {} + {}",
            pathway,
            date_time,
            symbol,
            before.len(),
            during.len()
        );
        let hours_active = self.hours_active(anchor.date());
        if before.is_empty() && during.is_empty() {
            return Ok(ListPayload {
                hour: -1,
                hours_active,
                counts: [0, 0],
                items: Vec::new(),
                more_before: None,
                more_after: None,
            });
        }
        let (first, last) = self.span();
        Ok(ListPayload {
            hour: anchor.hour() as i32,
            hours_active,
            counts: [before.len(), during.len()],
            items: [before, during].concat(),
            more_before: Some(first < anchor - hour),
            more_after: Some(last + self.scan_offset(self.config.scans.len()) >= anchor + hour),
        })
    }

    async fn load(&self, pathway: &str, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let item = ItemName::parse(name)?;
        let stamp = format!("{}-{}", item.day, item.time);
        let time = NaiveDateTime::parse_from_str(&stamp, ITEM_FORMAT)
            .map_err(|_| not_found(format!("{name} not found")))?;
        let (first, last) = self.span();
        let known = item.product().is_some()
            && self.config.scans.contains(&item.scan)
            && time >= first
            && time <= last + self.scan_offset(self.config.scans.len());
        if !known {
            return Err(not_found(format!("{name} not found")));
        }
        debug!("Load {}/{}", pathway, name);
        Ok(self.sweep(&item, time).encode())
    }

    async fn month(&self, pathway: &str, day: &str) -> Result<MonthPayload, ArchiveError> {
        let day = NaiveDate::parse_from_str(day, "%Y%m%d")
            .map_err(|_| ArchiveError::InvalidDay(day.to_string()))?;
        debug!("Month {} {}", pathway, day);
        Ok(self.days_active(day))
    }

    async fn catchup(&self, pathway: &str) -> Result<CatchupPayload, ArchiveError> {
        let latest = self.latest();
        let newest = latest + self.scan_offset(self.config.scans.len().saturating_sub(1));
        let anchor = hour_start(newest);
        let items = self.items_between(anchor, anchor + TimeDelta::hours(1), 'Z');
        let latest_scan = self.config.scans.last().cloned().unwrap_or_default();
        info!("Catchup {} at {}", pathway, anchor);
        Ok(CatchupPayload {
            date_time_string: anchor.format(LIST_FORMAT).to_string(),
            hours_active: self.hours_active(anchor.date()),
            days_active: self.days_active(anchor.date()),
            latest_scan,
            hour: anchor.hour() as i32,
            items,
            years_active: self.years_active(),
        })
    }

    async fn feed(&self, pathway: &str) -> Result<mpsc::Receiver<FeedPayload>, ArchiveError> {
        let (tx, rx) = mpsc::channel(FEED_DEPTH);
        let every = self.config.feed_interval_ms;
        info!("Feed {} every {} ms", pathway, every);
        let catalog = self.clone();
        tokio::spawn(async move {
            if every == 0 {
                tx.closed().await;
                return;
            }
            let period = Duration::from_millis(every);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (latest, items) = catalog.grow();
                        let payload = FeedPayload {
                            items,
                            hours_active: catalog.hours_active(latest.date()),
                        };
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            debug!("Memory feed ended");
        });
        Ok(rx)
    }
}
