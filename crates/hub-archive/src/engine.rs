//! UI-side archive engine
//!
//! [`Archive`] is the handle a front end holds. Every operation posts a task
//! to the worker and returns at once; [`Archive::next`] later folds the
//! worker's replies into state.
//!
//! # Request Guards
//!
//! Four request categories each allow one outstanding request:
//!
//! | Guard | Operations | Watchdog |
//! |-------|------------|----------|
//! | items | `table`, `prepend`, `append` | yes |
//! | days | `month` | yes |
//! | sweep | `load_index` | yes |
//! | product | `switch` | no |
//!
//! A second request while one is pending is refused with
//! [`ArchiveError::Busy`]. A reply is applied only if it carries the id of
//! the request its guard is waiting for; anything else is stale and dropped.
//! The one exception is a late reply to a request whose watchdog fired: the
//! worker has already committed that list or sweep, so its snapshot is
//! adopted without touching the guard.
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_archive::{Archive, ArchiveConfig, HttpCatalog};
//!
//! let mut archive = Archive::spawn(HttpCatalog::new("https://radarhub.arrc.ou.edu"), ArchiveConfig::default());
//! archive.init("px1000")?;
//! archive.table(day, 19)?;
//! while let Some(event) = archive.next().await {
//!     // redraw
//! }
//! ```

use std::future::pending;

use chrono::{DateTime, NaiveDate, Utc};
use hub_ingest::SessionCore;
use hub_protocol::{Product, Sweep};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::age::Ages;
use crate::catalog::Catalog;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::events::ArchiveEvent;
use crate::grid::Grid;
use crate::guard::{Guard, GuardKind, InFlight, RequestId, RequestIds};
use crate::mode::{ListMode, LiveUpdate, UpdateRequest};
use crate::scroller::ScrollTarget;
use crate::window::{Fetch, ListShape, ListView, ScrollOutcome};
use crate::worker::{run_archive_worker, ArchiveTask, WorkerReply, WorkerResponse};

/// Parse a `YYYYMMDD` day
pub fn parse_day(day: &str) -> Result<NaiveDate, ArchiveError> {
    NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| ArchiveError::InvalidDay(day.to_string()))
}

struct Guards {
    items: Guard,
    days: Guard,
    sweep: Guard,
    product: Guard,
}

impl Guards {
    fn new(config: &ArchiveConfig) -> Self {
        let watchdog = Some(config.watchdog());
        Self {
            items: Guard::new(GuardKind::Items, watchdog),
            days: Guard::new(GuardKind::Days, watchdog),
            sweep: Guard::new(GuardKind::Sweep, watchdog),
            product: Guard::new(GuardKind::Product, None),
        }
    }

    fn all_mut(&mut self) -> [&mut Guard; 4] {
        [
            &mut self.items,
            &mut self.days,
            &mut self.sweep,
            &mut self.product,
        ]
    }

    fn get_mut(&mut self, kind: GuardKind) -> &mut Guard {
        match kind {
            GuardKind::Items => &mut self.items,
            GuardKind::Days => &mut self.days,
            GuardKind::Sweep => &mut self.sweep,
            GuardKind::Product => &mut self.product,
        }
    }

    /// Guard that was waiting for `request`, now settled
    fn settle(&mut self, request: RequestId) -> Option<GuardKind> {
        self.all_mut()
            .into_iter()
            .find_map(|guard| guard.settle(request).then(|| guard.kind()))
    }

    fn next_deadline(&self) -> Option<Instant> {
        [&self.items, &self.days, &self.sweep, &self.product]
            .into_iter()
            .filter_map(Guard::deadline)
            .min()
    }
}

/// UI-side handle of an archive session
pub struct Archive {
    task_tx: mpsc::Sender<ArchiveTask>,
    reply_rx: mpsc::Receiver<WorkerReply>,
    worker: JoinHandle<()>,
    config: ArchiveConfig,
    core: SessionCore,
    ids: RequestIds,
    guards: Guards,
    grid: Option<Grid>,
    sweep: Option<Sweep>,
    /// Requests released by a watchdog whose replies may still arrive
    abandoned: Vec<RequestId>,
    live_update: Option<LiveUpdate>,
    view: ListView,
    ages: Ages,
    age_ticker: Interval,
}

impl Archive {
    /// Spawn a worker on the current tokio runtime
    pub fn spawn<C: Catalog>(catalog: C, config: ArchiveConfig) -> Self {
        let (task_tx, task_rx) = mpsc::channel(config.channel_depth.max(1));
        let (reply_tx, reply_rx) = mpsc::channel(config.channel_depth.max(1));
        let core = SessionCore::new(config.message_lifetime(), config.message_lifetime());
        let mut age_ticker = interval(config.age_refresh());
        age_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let view = ListView::new(config.window.clone());
        let guards = Guards::new(&config);
        let worker = tokio::spawn(run_archive_worker(
            catalog,
            config.clone(),
            task_rx,
            reply_tx,
        ));
        Self {
            task_tx,
            reply_rx,
            worker,
            config,
            core,
            ids: RequestIds::default(),
            guards,
            grid: None,
            sweep: None,
            abandoned: Vec::new(),
            live_update: None,
            view,
            ages: Ages::default(),
            age_ticker,
        }
    }

    fn post(&self, task: ArchiveTask) -> Result<(), ArchiveError> {
        self.task_tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => {
                warn!("Archive worker queue full, dropping {:?}", task);
                ArchiveError::Busy("worker")
            }
            TrySendError::Closed(_) => ArchiveError::WorkerGone,
        })
    }

    /// Post a guarded task built around a fresh request id
    fn post_guarded(
        &mut self,
        kind: GuardKind,
        task: impl FnOnce(RequestId) -> ArchiveTask,
    ) -> Result<RequestId, ArchiveError> {
        if self.guards.get_mut(kind).is_pending() {
            debug!("{} request in flight, ignoring", kind.name());
            return Err(ArchiveError::Busy(kind.name()));
        }
        let request = self.ids.next_id();
        self.post(task(request))?;
        let _ = self.guards.get_mut(kind).begin(request, Instant::now());
        Ok(request)
    }

    /// Start browsing `pathway` and apply the configured live-update mode
    pub fn init(&mut self, pathway: impl Into<String>) -> Result<(), ArchiveError> {
        let pathway = pathway.into();
        info!("Archive init {}", pathway);
        self.post(ArchiveTask::Init { pathway })?;
        self.toggle_live_update(self.config.live_update.into())
    }

    /// Items around `hour` of `day`
    pub fn table(&mut self, day: NaiveDate, hour: u32) -> Result<RequestId, ArchiveError> {
        if hour > 23 {
            return Err(ArchiveError::InvalidHour(hour));
        }
        let symbol = self.grid.as_ref().map_or(Product::Z, |grid| grid.symbol);
        self.post_guarded(GuardKind::Items, |request| ArchiveTask::Table {
            request,
            day,
            hour,
            symbol,
        })
    }

    /// Coverage of the month containing `day`
    pub fn month(&mut self, day: NaiveDate) -> Result<RequestId, ArchiveError> {
        self.post_guarded(GuardKind::Days, |request| ArchiveTask::Month { request, day })
    }

    /// Add the hour before the window
    pub fn prepend(&mut self) -> Result<RequestId, ArchiveError> {
        self.post_guarded(GuardKind::Items, |request| ArchiveTask::Prepend { request })
    }

    /// Add the hour after the window
    pub fn append(&mut self) -> Result<RequestId, ArchiveError> {
        self.post_guarded(GuardKind::Items, |request| ArchiveTask::Append { request })
    }

    /// Select and load the item at `index`
    ///
    /// Out-of-range indices are refused without touching state; selecting
    /// the item that is already selected does nothing.
    pub fn load_index(&mut self, index: isize) -> Result<(), ArchiveError> {
        let (items, selected) = match &self.grid {
            Some(grid) => (grid.items.as_slice(), grid.index),
            None => (&[][..], None),
        };
        let Some(item) = usize::try_from(index).ok().and_then(|i| items.get(i)) else {
            warn!("Index {} out of range (0..{})", index, items.len());
            return Err(ArchiveError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        };
        let index = index as usize;
        if selected == Some(index) {
            debug!("Index {} already selected", index);
            return Ok(());
        }
        let text = format!("Loading {item} ...");
        self.post_guarded(GuardKind::Sweep, |request| ArchiveTask::Select { request, index })?;
        self.core.show_message(text, Instant::now());
        Ok(())
    }

    /// Show another product of the same selection
    pub fn switch(&mut self, symbol: Product) -> Result<(), ArchiveError> {
        let Some(grid) = &self.grid else {
            return Ok(());
        };
        if grid.index.is_none() || grid.items.is_empty() || grid.symbol == symbol {
            debug!("Nothing to switch to {}", symbol);
            return Ok(());
        }
        info!("Switch {} -> {}", grid.symbol, symbol);
        self.post_guarded(GuardKind::Product, |request| ArchiveTask::Change { request, symbol })?;
        Ok(())
    }

    pub fn next_product(&mut self) -> Result<(), ArchiveError> {
        let symbol = self.symbol().next();
        self.switch(symbol)
    }

    pub fn prev_product(&mut self) -> Result<(), ArchiveError> {
        let symbol = self.symbol().prev();
        self.switch(symbol)
    }

    pub fn toggle_live_update(&mut self, mode: UpdateRequest) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::Toggle { mode })
    }

    /// Go offline unless already offline
    pub fn disable_live_update(&mut self) -> Result<(), ArchiveError> {
        match self.live_update {
            Some(LiveUpdate::Scan | LiveUpdate::Always) => {
                info!("Live update off");
                self.toggle_live_update(UpdateRequest::Offline)
            }
            _ => Ok(()),
        }
    }

    pub fn catchup(&mut self) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::Catchup)
    }

    pub fn navigate_forward(&mut self) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::Forward)
    }

    pub fn navigate_backward(&mut self) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::Backward)
    }

    pub fn navigate_forward_scan(&mut self) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::ForwardScan)
    }

    pub fn navigate_backward_scan(&mut self) -> Result<(), ArchiveError> {
        self.post(ArchiveTask::BackwardScan)
    }

    /// The selection is the newest volume of the current hour
    pub fn is_latest_volume(&self) -> bool {
        self.is_latest_volume_at(Utc::now())
    }

    pub fn is_latest_volume_at(&self, now: DateTime<Utc>) -> bool {
        self.grid
            .as_ref()
            .is_some_and(|grid| grid.is_latest_volume_at(now))
    }

    /// Recompute age strings of the visible rows; true if any text changed
    pub fn update_age(&mut self) -> bool {
        self.update_age_at(Utc::now())
    }

    pub fn update_age_at(&mut self, now: DateTime<Utc>) -> bool {
        let Some(grid) = &self.grid else {
            return false;
        };
        let rows = self.view.window().rows(grid.items.len(), self.view.params());
        let changed = self
            .ages
            .update(grid.items[rows].iter().map(String::as_str), now);
        if changed {
            self.core.bump();
        }
        changed
    }

    /// Scroll the list; fetches the neighbouring hour when getting close to
    /// an end and turns live update off when far from the selection
    pub fn scroll(&mut self, delta: f32) -> ScrollOutcome {
        let shape = self.shape();
        let live = matches!(self.live_update, Some(LiveUpdate::Scan | LiveUpdate::Always));
        let before = self.view.window().start;
        let outcome = self.view.pan(delta, &shape, live);
        let fetched = match outcome.fetch {
            Some(Fetch::Prepend) => Some(self.prepend()),
            Some(Fetch::Append) => Some(self.append()),
            None => None,
        };
        if let Some(Err(e)) = fetched {
            debug!("Fetch not issued: {}", e);
            self.view.clear_pending();
        }
        if outcome.disable_live {
            if let Err(e) = self.disable_live_update() {
                warn!("Cannot turn live update off: {}", e);
            }
        }
        if outcome.window.start != before || outcome.excess != 0.0 {
            self.core.bump();
        }
        outcome
    }

    fn shape(&self) -> ListShape {
        self.grid.as_ref().map(ListShape::from).unwrap_or_default()
    }

    /// Release guards whose watchdog has passed
    pub fn expire(&mut self, now: Instant) -> Vec<GuardKind> {
        self.core.expire(now);
        let mut expired = Vec::new();
        for guard in self.guards.all_mut() {
            let state = guard.state();
            if guard.expire(now) {
                expired.push(guard.kind());
                if let InFlight::Pending { request, .. } = state {
                    self.abandoned.push(request);
                }
            }
        }
        if expired.contains(&GuardKind::Items) {
            self.view.clear_pending();
        }
        expired
    }

    /// Wait for the next change and fold it into state
    ///
    /// Stale replies are dropped while waiting; so are expired messages.
    /// Returns `None` once the worker has stopped.
    pub async fn next(&mut self) -> Option<ArchiveEvent> {
        loop {
            let deadline = match (self.guards.next_deadline(), self.core.next_deadline()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            tokio::select! {
                reply = self.reply_rx.recv() => {
                    if let Some(event) = self.apply(reply?, Instant::now()) {
                        return Some(event);
                    }
                }
                _ = sleep_until_opt(deadline) => {
                    if let Some(kind) = self.expire(Instant::now()).into_iter().next() {
                        return Some(ArchiveEvent::Watchdog(kind));
                    }
                }
                _ = self.age_ticker.tick() => {
                    if self.update_age() {
                        return Some(ArchiveEvent::Age);
                    }
                }
            }
        }
    }

    /// Fold one worker reply into state; `None` when it was stale or silent
    pub fn apply(&mut self, reply: WorkerReply, now: Instant) -> Option<ArchiveEvent> {
        if let Some(request) = reply.request {
            match self.guards.settle(request) {
                Some(GuardKind::Items) => self.view.clear_pending(),
                Some(_) => {}
                None if self.take_abandoned(request) && reply.response.is_snapshot() => {
                    debug!("Adopting late reply to {}", request);
                }
                None => {
                    debug!("Dropping stale reply to {}", request);
                    return None;
                }
            }
        }

        let event = match reply.response {
            WorkerResponse::Init(grid) | WorkerResponse::Table(grid) => {
                let mut grid = *grid;
                grid.tic = self.grid.as_ref().map_or(0, |g| g.tic);
                self.view.reconcile(&ListShape::from(&grid));
                self.grid = Some(grid);
                ArchiveEvent::Grid
            }
            WorkerResponse::Index {
                index,
                paths_active,
                scan,
            } => {
                let grid = self.grid.get_or_insert_with(Grid::default);
                grid.index = index;
                grid.paths_active = paths_active;
                grid.scan = scan;
                grid.list_mode = ListMode::Navigate;
                let shape = ListShape::from(&*grid);
                self.view.reveal(&shape);
                ArchiveEvent::Grid
            }
            WorkerResponse::Load(sweep) => {
                debug!("Sweep {}", sweep.title_string);
                self.sweep = Some(*sweep);
                ArchiveEvent::Sweep
            }
            WorkerResponse::Month(days) => {
                if let Some(grid) = self.grid.as_mut() {
                    grid.days_active = days;
                }
                ArchiveEvent::Month
            }
            WorkerResponse::Reset(text) => {
                self.sweep = None;
                self.core.show_message(text.clone(), now);
                ArchiveEvent::Reset(text)
            }
            WorkerResponse::State { update, message } => {
                self.live_update = update;
                if let Some(message) = message {
                    self.core.show_message(message, now);
                }
                ArchiveEvent::State(update)
            }
            WorkerResponse::Message(text) => {
                self.core.show_message(text.clone(), now);
                ArchiveEvent::Message(text)
            }
            WorkerResponse::Reload => {
                info!("Reloading after the live feed was lost");
                if let Err(e) = self.catchup() {
                    warn!("Cannot reload: {}", e);
                }
                return None;
            }
        };
        if let Some(grid) = self.grid.as_mut() {
            grid.tic += 1;
        }
        self.core.bump();
        Some(event)
    }

    fn take_abandoned(&mut self, request: RequestId) -> bool {
        match self.abandoned.iter().position(|r| *r == request) {
            Some(k) => {
                self.abandoned.swap_remove(k);
                true
            }
            None => false,
        }
    }

    /// Stop the worker and wait for it
    pub async fn shutdown(self) {
        let _ = self.task_tx.send(ArchiveTask::Shutdown).await;
        let _ = self.worker.await;
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// `None` until the first `init` or `table` reply
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn sweep(&self) -> Option<&Sweep> {
        self.sweep.as_ref()
    }

    /// Name of the selected item
    pub fn selected(&self) -> Result<&str, ArchiveError> {
        self.grid
            .as_ref()
            .and_then(|grid| grid.index.and_then(|i| grid.items.get(i)))
            .map(String::as_str)
            .ok_or(ArchiveError::NoSelection)
    }

    pub fn symbol(&self) -> Product {
        self.grid.as_ref().map_or(Product::Z, |grid| grid.symbol)
    }

    pub fn live_update(&self) -> Option<LiveUpdate> {
        self.live_update
    }

    pub fn view(&self) -> &ListView {
        &self.view
    }

    /// Age strings of the visible rows
    pub fn ages(&self) -> &[String] {
        self.ages.strings()
    }

    pub fn message(&self) -> &str {
        self.core.message()
    }

    pub fn tic(&self) -> u64 {
        self.core.tic()
    }

    pub fn items_updating(&self) -> bool {
        self.guards.items.is_pending()
    }

    pub fn day_has_data_updating(&self) -> bool {
        self.guards.days.is_pending()
    }

    pub fn sweep_loading(&self) -> bool {
        self.guards.sweep.is_pending()
    }

    pub fn product_switching(&self) -> bool {
        self.guards.product.is_pending()
    }
}

impl ScrollTarget for Archive {
    fn pan(&mut self, delta: f32) {
        self.scroll(delta);
    }

    fn overdrive(&self) -> f32 {
        self.view.overdrive()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
