//! Integration tests for the archive engine
//!
//! These tests run the real worker against an in-memory catalog and verify:
//! - Watchdog recovery of the item guard under paused time
//! - That replies to anything but the pending request are dropped, while a
//!   late list after a watchdog release is still adopted
//! - Window reconciliation after a scroll-triggered prepend
//! - Index bounds, the product ring and the latest-volume query
//! - Live tail through the catalog feed, including reload after feed loss

use std::collections::HashMap;
use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use hub_archive::{
    Archive, ArchiveConfig, ArchiveError, ArchiveEvent, Catalog, CatchupPayload, FeedPayload,
    Fetch, GuardKind, ListPayload, LiveUpdate, MonthPayload, RequestId, UpdateRequest,
    WorkerReply, WorkerResponse,
};
use hub_protocol::sweep::RawSweep;
use hub_protocol::Product;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    #[derive(Default)]
    pub struct CatalogState {
        pub lists: HashMap<String, ListPayload>,
        pub month: MonthPayload,
        pub catchup: Option<CatchupPayload>,
        /// `list` never answers
        pub hang_list: bool,
        /// `list` answers only after this long
        pub list_delay: Option<Duration>,
        pub feed: Option<mpsc::Sender<FeedPayload>>,
        pub feed_calls: usize,
        pub loads: Vec<String>,
    }

    /// In-memory catalog; clones share state
    #[derive(Clone, Default)]
    pub struct MockCatalog {
        pub state: Arc<Mutex<CatalogState>>,
    }

    impl MockCatalog {
        pub fn with<F: FnOnce(&mut CatalogState)>(&self, f: F) {
            f(&mut self.state.lock().unwrap());
        }

        pub fn feed_calls(&self) -> usize {
            self.state.lock().unwrap().feed_calls
        }

        pub async fn push_feed(&self, payload: FeedPayload) {
            let tx = self.state.lock().unwrap().feed.clone().expect("feed open");
            tx.send(payload).await.unwrap();
        }

        pub fn close_feed(&self) {
            self.state.lock().unwrap().feed = None;
        }
    }

    impl Catalog for MockCatalog {
        async fn list(
            &self,
            _pathway: &str,
            date_time: &str,
            _symbol: char,
        ) -> Result<ListPayload, ArchiveError> {
            let (hang, delay, found) = {
                let state = self.state.lock().unwrap();
                (state.hang_list, state.list_delay, state.lists.get(date_time).cloned())
            };
            if hang {
                pending::<()>().await;
            }
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            found.ok_or_else(|| ArchiveError::Catalog {
                status: 404,
                text: format!("No list for {date_time}"),
            })
        }

        async fn load(&self, _pathway: &str, name: &str) -> Result<Vec<u8>, ArchiveError> {
            self.state.lock().unwrap().loads.push(name.to_string());
            Ok(sweep_bytes())
        }

        async fn month(&self, _pathway: &str, _day: &str) -> Result<MonthPayload, ArchiveError> {
            Ok(self.state.lock().unwrap().month.clone())
        }

        async fn catchup(&self, _pathway: &str) -> Result<CatchupPayload, ArchiveError> {
            self.state
                .lock()
                .unwrap()
                .catchup
                .clone()
                .ok_or(ArchiveError::Catalog {
                    status: 500,
                    text: String::new(),
                })
        }

        async fn feed(&self, _pathway: &str) -> Result<mpsc::Receiver<FeedPayload>, ArchiveError> {
            let (tx, rx) = mpsc::channel(8);
            let mut state = self.state.lock().unwrap();
            state.feed = Some(tx);
            state.feed_calls += 1;
            Ok(rx)
        }
    }

    pub fn sweep_bytes() -> Vec<u8> {
        RawSweep {
            nr: 3,
            scan_elevation: 4.0,
            range_spacing: 0.15,
            info: r#"{"gatewidth":150,"waveform":"s01"}"#.into(),
            elevations: vec![4.0; 4],
            azimuths: vec![0.0, 15.0, 30.0, 45.0],
            values: vec![1; 12],
            ..Default::default()
        }
        .encode()
    }

    /// `n` items of `scan` four minutes apart
    pub fn items(hour: u32, n: u32, scan: &str) -> Vec<String> {
        (0..n)
            .map(|k| format!("20220315-{hour:02}{:02}00-{scan}-Z", k * 4))
            .collect()
    }

    pub fn hours(active: &[(usize, u32)]) -> Vec<u32> {
        let mut hours = vec![0; 24];
        for &(h, n) in active {
            hours[h] = n;
        }
        hours
    }

    /// Lists for 17:00 and 18:00 with earlier data available
    pub fn two_lists() -> HashMap<String, ListPayload> {
        let hours_active = hours(&[(16, 10), (17, 15), (18, 5)]);
        let at_18 = ListPayload {
            hour: 18,
            hours_active: hours_active.clone(),
            counts: [15, 5],
            items: [items(17, 15, "E2.0"), items(18, 5, "E2.0")].concat(),
            more_before: Some(true),
            more_after: Some(false),
        };
        let at_17 = ListPayload {
            hour: 17,
            hours_active,
            counts: [10, 15],
            items: [items(16, 10, "E2.0"), items(17, 15, "E2.0")].concat(),
            more_before: Some(false),
            more_after: Some(true),
        };
        HashMap::from([
            ("20220315-1800".to_string(), at_18),
            ("20220315-1700".to_string(), at_17),
        ])
    }

    pub fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, 15).unwrap()
    }

    pub fn offline_config() -> ArchiveConfig {
        ArchiveConfig {
            live_update: LiveUpdate::Offline,
            ..ArchiveConfig::default()
        }
    }

    /// Read events until `pred` holds
    pub async fn until(
        archive: &mut Archive,
        mut pred: impl FnMut(&ArchiveEvent, &Archive) -> bool,
    ) -> ArchiveEvent {
        timeout(Duration::from_secs(60), async {
            loop {
                let event = archive.next().await.expect("worker running");
                if pred(&event, archive) {
                    return event;
                }
            }
        })
        .await
        .expect("event within a minute")
    }

    /// Archive with the two-hour list at 18:00 loaded and its sweep shown
    pub async fn loaded_archive() -> (Archive, MockCatalog) {
        let catalog = MockCatalog::default();
        catalog.with(|s| s.lists = two_lists());
        let mut archive = Archive::spawn(catalog.clone(), offline_config());
        archive.table(day(), 18).unwrap();
        until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        (archive, catalog)
    }
}

// ============================================================================
// Guard Tests
// ============================================================================

mod guard_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn watchdog_releases_items_after_three_seconds() {
        let catalog = helpers::MockCatalog::default();
        catalog.with(|s| s.hang_list = true);
        let mut archive = Archive::spawn(catalog, ArchiveConfig::default());

        let t0 = Instant::now();
        archive.table(helpers::day(), 18).unwrap();
        assert!(archive.items_updating());
        assert!(matches!(
            archive.table(helpers::day(), 18),
            Err(ArchiveError::Busy("items"))
        ));

        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::Watchdog(_))).await;
        assert_eq!(event, ArchiveEvent::Watchdog(GuardKind::Items));
        assert_eq!(Instant::now() - t0, Duration::from_millis(3000));
        assert!(!archive.items_updating());

        // Not wedged
        assert!(archive.table(helpers::day(), 18).is_ok());
        assert!(archive.items_updating());
    }

    #[tokio::test]
    async fn stale_reply_is_dropped() {
        let catalog = helpers::MockCatalog::default();
        catalog.with(|s| s.hang_list = true);
        let mut archive = Archive::spawn(catalog, helpers::offline_config());

        let request = archive.table(helpers::day(), 18).unwrap();
        let stale = WorkerReply {
            request: Some(RequestId(request.0 + 100)),
            response: WorkerResponse::Table(Box::default()),
        };
        assert_eq!(archive.apply(stale, Instant::now()), None);
        assert!(archive.grid().is_none());
        assert!(archive.items_updating());

        let fresh = WorkerReply {
            request: Some(request),
            response: WorkerResponse::Table(Box::default()),
        };
        assert_eq!(archive.apply(fresh.clone(), Instant::now()), Some(ArchiveEvent::Grid));
        assert!(!archive.items_updating());
        assert!(archive.grid().is_some());

        // A duplicate of an answered request is stale too
        assert_eq!(archive.apply(fresh, Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn late_list_after_watchdog_is_adopted() {
        let (mut archive, catalog) = helpers::loaded_archive().await;
        catalog.with(|s| s.list_delay = Some(Duration::from_secs(5)));

        archive.prepend().unwrap();
        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::Watchdog(_))).await;
        assert_eq!(event, ArchiveEvent::Watchdog(GuardKind::Items));
        assert!(!archive.items_updating());

        // The worker moved to 17:00 regardless; so does the UI
        helpers::until(&mut archive, |e, a| {
            *e == ArchiveEvent::Grid
                && a.grid().is_some_and(|g| g.date_time_string == "20220315-1700")
        })
        .await;
        assert_eq!(archive.grid().unwrap().items.len(), 25);
        assert!(!archive.items_updating());

        archive.navigate_backward().unwrap();
        // The sweep of the late list, then the one navigated to
        let mut sweeps = 0;
        helpers::until(&mut archive, |e, _| {
            if *e == ArchiveEvent::Sweep {
                sweeps += 1;
            }
            sweeps == 2
        })
        .await;

        let grid = archive.grid().unwrap();
        assert_eq!(grid.date_time_string, "20220315-1700");
        assert_eq!(grid.index, Some(23));
        assert_eq!(archive.selected().unwrap(), "20220315-175200-E2.0-Z");
        assert_eq!(archive.selected().unwrap(), archive.sweep().unwrap().name);
    }

    #[tokio::test]
    async fn unsolicited_replies_always_apply() {
        let catalog = helpers::MockCatalog::default();
        let mut archive = Archive::spawn(catalog, helpers::offline_config());
        let reply = WorkerReply {
            request: None,
            response: WorkerResponse::Message("No Data".into()),
        };
        assert_eq!(
            archive.apply(reply, Instant::now()),
            Some(ArchiveEvent::Message("No Data".into()))
        );
        assert_eq!(archive.message(), "No Data");
    }
}

// ============================================================================
// Table and Selection Tests
// ============================================================================

mod table_tests {
    use super::*;

    #[tokio::test]
    async fn table_selects_newest_and_loads_it() {
        let (archive, catalog) = helpers::loaded_archive().await;
        let grid = archive.grid().unwrap();
        assert_eq!(grid.date_time_string, "20220315-1800");
        assert_eq!(grid.items.len(), 20);
        assert_eq!(grid.index, Some(19));
        assert_eq!(grid.paths_active, [true, true, false, false]);
        assert_eq!(archive.selected().unwrap(), "20220315-181600-E2.0-Z");
        assert_eq!(archive.sweep().unwrap().name, "20220315-181600-E2.0-Z");
        assert!(!archive.items_updating());
        assert_eq!(catalog.state.lock().unwrap().loads.len(), 1);

        // Selected row sits one stem below the top of the window
        assert_eq!(archive.view().window().start, 14);
    }

    #[tokio::test]
    async fn tic_keeps_rising_across_new_lists() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        for _ in 0..2 {
            archive.navigate_backward().unwrap();
            helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        }
        let before = archive.grid().unwrap().tic;
        assert!(before > 1);

        archive.table(helpers::day(), 17).unwrap();
        helpers::until(&mut archive, |e, a| {
            *e == ArchiveEvent::Grid
                && a.grid().is_some_and(|g| g.date_time_string == "20220315-1700")
        })
        .await;
        assert!(archive.grid().unwrap().tic > before);
    }

    #[tokio::test]
    async fn missing_hour_reports_server_text() {
        let catalog = helpers::MockCatalog::default();
        let mut archive = Archive::spawn(catalog, helpers::offline_config());
        archive.table(helpers::day(), 3).unwrap();
        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::Message(_))).await;
        assert_eq!(event, ArchiveEvent::Message("No list for 20220315-0300".into()));
        assert!(!archive.items_updating());
    }

    #[tokio::test]
    async fn invalid_hour_is_refused() {
        let catalog = helpers::MockCatalog::default();
        let mut archive = Archive::spawn(catalog, helpers::offline_config());
        assert!(matches!(
            archive.table(helpers::day(), 24),
            Err(ArchiveError::InvalidHour(24))
        ));
        assert!(!archive.items_updating());
    }

    #[tokio::test]
    async fn load_index_bounds() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        assert!(matches!(
            archive.load_index(-1),
            Err(ArchiveError::IndexOutOfRange { index: -1, len: 20 })
        ));
        assert!(matches!(
            archive.load_index(20),
            Err(ArchiveError::IndexOutOfRange { index: 20, len: 20 })
        ));
        assert_eq!(archive.grid().unwrap().index, Some(19));
        assert!(!archive.sweep_loading());

        // Already selected
        archive.load_index(19).unwrap();
        assert!(!archive.sweep_loading());

        archive.load_index(4).unwrap();
        assert!(archive.sweep_loading());
        assert!(archive.message().starts_with("Loading 20220315-171600-E2.0-Z"));
        helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        assert!(!archive.sweep_loading());
        assert_eq!(archive.grid().unwrap().index, Some(4));
    }

    #[tokio::test]
    async fn product_ring_closes() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        let mut seen = Vec::new();
        for _ in 0..6 {
            archive.next_product().unwrap();
            assert!(archive.product_switching());
            helpers::until(&mut archive, |e, a| {
                *e == ArchiveEvent::Sweep && !a.product_switching()
            })
            .await;
            seen.push(archive.symbol());
            let sweep = archive.sweep().unwrap();
            assert_eq!(sweep.symbol, archive.symbol().to_string());
        }
        assert_eq!(
            seen,
            vec![Product::V, Product::W, Product::D, Product::P, Product::R, Product::Z]
        );

        for _ in 0..6 {
            archive.prev_product().unwrap();
            helpers::until(&mut archive, |e, a| {
                *e == ArchiveEvent::Sweep && !a.product_switching()
            })
            .await;
        }
        assert_eq!(archive.symbol(), Product::Z);
        assert_eq!(archive.grid().unwrap().index, Some(19));
    }

    #[tokio::test]
    async fn switch_to_current_symbol_is_a_no_op() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        archive.switch(Product::Z).unwrap();
        assert!(!archive.product_switching());
    }

    #[tokio::test]
    async fn latest_volume_follows_selection() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        let now = Utc.with_ymd_and_hms(2022, 3, 15, 18, 30, 0).unwrap();
        assert!(archive.is_latest_volume_at(now));

        archive.navigate_backward().unwrap();
        helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        assert_eq!(archive.grid().unwrap().index, Some(18));
        assert!(!archive.is_latest_volume_at(now));

        let next_hour = Utc.with_ymd_and_hms(2022, 3, 15, 19, 0, 0).unwrap();
        archive.navigate_forward().unwrap();
        helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        assert!(!archive.is_latest_volume_at(next_hour));
    }

    #[tokio::test]
    async fn month_merges_coverage() {
        let (mut archive, catalog) = helpers::loaded_archive().await;
        catalog.with(|s| {
            s.month = [("20220314".to_string(), 2), ("20220315".to_string(), 4)]
                .into_iter()
                .collect()
        });
        archive.month(helpers::day()).unwrap();
        assert!(archive.day_has_data_updating());
        helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Month).await;
        assert!(!archive.day_has_data_updating());
        assert_eq!(archive.grid().unwrap().days_active["20220315"], 4);
    }

    #[tokio::test]
    async fn ages_change_only_with_text() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        let now = Utc.with_ymd_and_hms(2022, 3, 15, 18, 20, 0).unwrap();
        assert!(archive.update_age_at(now));
        assert_eq!(archive.ages().len(), 6);
        assert_eq!(archive.ages().last().map(String::as_str), Some("> 4 minutes ago"));
        assert!(!archive.update_age_at(now + chrono::TimeDelta::seconds(5)));
    }
}

// ============================================================================
// Windowing Tests
// ============================================================================

mod window_tests {
    use super::*;

    #[tokio::test]
    async fn scroll_up_prepends_and_keeps_place() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        assert_eq!(archive.view().window().start, 14);

        let outcome = archive.scroll(-64.0);
        assert_eq!(outcome.fetch, Some(Fetch::Prepend));
        assert_eq!(outcome.window.start, 13);
        assert!(archive.items_updating());

        helpers::until(&mut archive, |e, a| {
            *e == ArchiveEvent::Grid
                && a.grid().is_some_and(|g| g.date_time_string == "20220315-1700")
        })
        .await;
        assert_eq!(archive.grid().unwrap().items.len(), 25);
        // Ten new rows in front
        assert_eq!(archive.view().window().start, 23);
        assert!(!archive.view().window().task_pending);
    }

    #[tokio::test]
    async fn refused_prefetch_does_not_stick() {
        let (mut archive, _catalog) = helpers::loaded_archive().await;
        archive.table(helpers::day(), 18).unwrap();

        // Items guard busy: the scroll cannot prepend
        let outcome = archive.scroll(-64.0);
        assert_eq!(outcome.fetch, Some(Fetch::Prepend));
        assert!(!archive.view().window().task_pending);
    }
}

// ============================================================================
// Live Update Tests
// ============================================================================

mod live_tests {
    use super::*;

    fn catchup() -> CatchupPayload {
        CatchupPayload {
            date_time_string: "20220315-1800".into(),
            hours_active: helpers::hours(&[(18, 3)]),
            days_active: Default::default(),
            latest_scan: "E4.0".into(),
            hour: 18,
            items: vec![
                "20220315-180000-E4.0-Z".into(),
                "20220315-180500-E2.0-Z".into(),
                "20220315-181000-E4.0-Z".into(),
            ],
            years_active: vec![0, 12, 300],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn feed_items_are_followed_and_loss_reloads() {
        let catalog = helpers::MockCatalog::default();
        catalog.with(|s| s.catchup = Some(catchup()));
        let mut archive = Archive::spawn(catalog.clone(), ArchiveConfig::default());
        archive.init("px1000").unwrap();

        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::State(_))).await;
        assert_eq!(event, ArchiveEvent::State(Some(LiveUpdate::Scan)));
        assert_eq!(archive.message(), "Connecting to px1000 stream ...");
        let grid = archive.grid().unwrap();
        assert_eq!(grid.index, Some(2));
        assert_eq!(grid.years_active[101], 12);

        catalog
            .push_feed(FeedPayload {
                items: vec!["20220315-181500-E4.0-Z".into()],
                hours_active: helpers::hours(&[(18, 4)]),
            })
            .await;
        helpers::until(&mut archive, |e, _| *e == ArchiveEvent::Sweep).await;
        assert_eq!(archive.sweep().unwrap().name, "20220315-181500-E4.0-Z");
        assert_eq!(archive.grid().unwrap().index, Some(3));
        assert_eq!(archive.grid().unwrap().latest_hour, Some(18));

        catalog.close_feed();
        helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::State(_))).await;
        assert_eq!(catalog.feed_calls(), 2);

        archive.toggle_live_update(UpdateRequest::Offline).unwrap();
        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::State(_))).await;
        assert_eq!(event, ArchiveEvent::State(Some(LiveUpdate::Offline)));
        assert_eq!(archive.live_update(), Some(LiveUpdate::Offline));
    }

    #[tokio::test]
    async fn far_scroll_turns_live_update_off() {
        let catalog = helpers::MockCatalog::default();
        let mut long = catchup();
        long.items = (0..60)
            .map(|k| format!("20220315-18{:02}00-E4.0-Z", k))
            .collect();
        catalog.with(|s| s.catchup = Some(long));
        let mut archive = Archive::spawn(catalog, ArchiveConfig::default());
        archive.init("px1000").unwrap();
        helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::State(_))).await;
        assert_eq!(archive.grid().unwrap().index, Some(59));
        assert_eq!(archive.view().window().start, 39);

        for _ in 0..20 {
            archive.scroll(-64.0);
        }
        let event = helpers::until(&mut archive, |e, _| matches!(e, ArchiveEvent::State(_))).await;
        assert_eq!(event, ArchiveEvent::State(Some(LiveUpdate::Offline)));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use hub_archive::{compute_window, scroll_window, ListMode, ListShape, Window, WindowParams};
    use proptest::prelude::*;

    fn mode() -> impl Strategy<Value = ListMode> {
        prop_oneof![
            Just(ListMode::Select),
            Just(ListMode::Prepend),
            Just(ListMode::Append),
            Just(ListMode::Catchup),
            Just(ListMode::Navigate),
        ]
    }

    fn shape() -> impl Strategy<Value = ListShape> {
        (0usize..200, 0usize..200, any::<bool>(), any::<bool>(), mode(), any::<Option<u8>>()).prop_map(
            |(before, during, more_before, more_after, mode, index)| {
                let len = before + during;
                ListShape {
                    len,
                    index: index.map(usize::from).filter(|&i| i < len),
                    counts: [before, during],
                    more_before,
                    more_after,
                    mode,
                }
            },
        )
    }

    proptest! {
        #[test]
        fn computed_start_stays_in_list(shape in shape(), hourly in 0usize..200) {
            let params = WindowParams::default();
            let previous = Window { hourly_start: hourly, ..Window::new(&params) };
            let window = compute_window(&previous, &shape, &params);
            prop_assert!(window.start <= shape.len.saturating_sub(1));
            prop_assert!(!window.task_pending);
        }

        #[test]
        fn scroll_never_passes_the_ends(shape in shape(), start in 0usize..400, delta in -400.0f32..400.0) {
            let params = WindowParams::default();
            let max_start = shape.len.saturating_sub(params.extent());
            let previous = Window { start: start.min(max_start), ..Window::new(&params) };
            let out = scroll_window(&previous, delta, &shape, &params, false);
            prop_assert!(out.window.start <= max_start);
            match out.fetch {
                Some(hub_archive::Fetch::Prepend) => prop_assert!(shape.more_before && delta < 0.0),
                Some(hub_archive::Fetch::Append) => prop_assert!(shape.more_after && delta > 0.0),
                None => {}
            }
        }
    }
}
