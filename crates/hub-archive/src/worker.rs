//! Archive worker
//!
//! The worker owns the authoritative [`Grid`] and every catalog call. It runs
//! one task at a time and answers with [`WorkerReply`]s. A reply to a guarded
//! task carries that task's [`RequestId`]; follow-up replies and anything the
//! worker does on its own (live feed, reloads) carry none.
//!
//! | Task | Replies |
//! |------|---------|
//! | `Table` | `Table` (id), then `Load` |
//! | `Change` | `Table`, then `Load` (id) |
//! | `Select` | `Index`, then `Load` (id) |
//! | `Month` | `Month` (id) |
//! | `Prepend` / `Append` | `Table` (id), `Load` if the selection moved |
//! | `Toggle` / `Catchup` | `Table`, `Load`, `State` |
//!
//! Failures of a guarded task are answered with a `Message` carrying the id,
//! so the caller's guard never waits for the watchdog when the worker knows
//! better.

use std::collections::BTreeMap;
use std::future::{pending, Future};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use hub_protocol::{Product, Sweep};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, FeedPayload};
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::grid::{latest_hour_of, Grid};
use crate::guard::RequestId;
use crate::mode::{ListMode, LiveUpdate, UpdateRequest};

const LIST_FORMAT: &str = "%Y%m%d-%H00";

/// Tasks posted to the archive worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTask {
    /// Start browsing `pathway`
    Init { pathway: String },
    /// Items around `hour` of `day`
    Table {
        request: RequestId,
        day: NaiveDate,
        hour: u32,
        symbol: Product,
    },
    /// Coverage of the month containing `day`
    Month { request: RequestId, day: NaiveDate },
    /// Select and load the item at `index`
    Select { request: RequestId, index: usize },
    /// Same hour, another product
    Change { request: RequestId, symbol: Product },
    /// Change the live-update mode
    Toggle { mode: UpdateRequest },
    /// Jump to the latest data
    Catchup,
    Prepend { request: RequestId },
    Append { request: RequestId },
    Forward,
    Backward,
    ForwardScan,
    BackwardScan,
    Shutdown,
}

/// What the worker has to say
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    /// Grid snapshot after `Init`
    Init(Box<Grid>),
    /// Grid snapshot after the item list changed
    Table(Box<Grid>),
    /// Only the selection moved
    Index {
        index: Option<usize>,
        paths_active: [bool; 4],
        scan: String,
    },
    /// Decoded sweep of the selected item
    Load(Box<Sweep>),
    /// Coverage of every month seen so far
    Month(BTreeMap<String, u8>),
    /// The server refused a sweep; the text explains why
    Reset(String),
    /// Live-update mode, with an optional status line
    State {
        update: Option<LiveUpdate>,
        message: Option<String>,
    },
    Message(String),
    /// The live feed is gone; catch up again
    Reload,
}

impl WorkerResponse {
    /// State the worker has already committed to its own grid
    pub fn is_snapshot(&self) -> bool {
        matches!(
            self,
            Self::Init(_) | Self::Table(_) | Self::Index { .. } | Self::Load(_) | Self::Month(_)
        )
    }
}

/// A worker response and the request it answers
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReply {
    pub request: Option<RequestId>,
    pub response: WorkerResponse,
}

fn user_text(e: &ArchiveError) -> String {
    match e {
        ArchiveError::Catalog { text, .. } if !text.is_empty() => text.clone(),
        other => other.to_string(),
    }
}

struct ArchiveWorker<C> {
    catalog: C,
    config: ArchiveConfig,
    reply_tx: mpsc::Sender<WorkerReply>,
    pathway: String,
    grid: Grid,
    update: Option<LiveUpdate>,
    feed: Option<mpsc::Receiver<FeedPayload>>,
    /// When to ask for a reload after the feed was lost
    retry: Option<Instant>,
}

impl<C: Catalog> ArchiveWorker<C> {
    async fn reply(&self, request: Option<RequestId>, response: WorkerResponse) {
        let _ = self.reply_tx.send(WorkerReply { request, response }).await;
    }

    async fn fetch<T>(
        &self,
        what: &'static str,
        request: impl Future<Output = Result<T, ArchiveError>>,
    ) -> Result<T, ArchiveError> {
        match timeout(self.config.request_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(ArchiveError::TimedOut(what)),
        }
    }

    fn table(&self) -> WorkerResponse {
        WorkerResponse::Table(Box::new(self.grid.clone()))
    }

    fn index(&self) -> WorkerResponse {
        WorkerResponse::Index {
            index: self.grid.index,
            paths_active: self.grid.paths_active,
            scan: self.grid.scan.clone(),
        }
    }

    /// Select `index`; the item to load, if the selection changed
    fn select(&mut self, index: usize) -> Option<String> {
        match self.grid.set_index(index) {
            Ok(item) => item,
            Err(e) => {
                warn!("Cannot select: {}", e);
                None
            }
        }
    }

    async fn handle(&mut self, task: ArchiveTask) {
        match task {
            ArchiveTask::Init { pathway } => {
                info!("Archive worker browsing {}", pathway);
                if pathway != self.pathway {
                    self.feed = None;
                    self.retry = None;
                }
                self.pathway = pathway;
                self.reply(None, WorkerResponse::Init(Box::new(self.grid.clone())))
                    .await;
            }
            ArchiveTask::Table {
                request,
                day,
                hour,
                symbol,
            } => match day.and_hms_opt(hour, 0, 0) {
                Some(date_time) => {
                    self.list(Some(request), None, date_time, symbol, ListMode::Select)
                        .await
                }
                None => {
                    let text = ArchiveError::InvalidHour(hour).to_string();
                    self.reply(Some(request), WorkerResponse::Message(text)).await;
                }
            },
            ArchiveTask::Month { request, day } => self.month(request, day).await,
            ArchiveTask::Select { request, index } => match self.grid.set_index(index) {
                Ok(Some(item)) => {
                    self.reply(None, self.index()).await;
                    self.load(Some(request), &item).await;
                }
                Ok(None) => self.reply(Some(request), self.index()).await,
                Err(e) => {
                    warn!("{}", e);
                    self.reply(Some(request), WorkerResponse::Message(e.to_string()))
                        .await;
                }
            },
            ArchiveTask::Change { request, symbol } => match self.grid.date_time() {
                Some(date_time) => {
                    self.list(None, Some(request), date_time, symbol, ListMode::Select)
                        .await
                }
                None => {
                    let text = format!("No list at {}", self.grid.date_time_string);
                    self.reply(Some(request), WorkerResponse::Message(text)).await;
                }
            },
            ArchiveTask::Toggle { mode } => self.toggle(mode).await,
            ArchiveTask::Catchup => self.catchup().await,
            ArchiveTask::Prepend { request } => self.neighbour(request, -1).await,
            ArchiveTask::Append { request } => self.neighbour(request, 1).await,
            ArchiveTask::Forward => self.navigate(self.grid.step(1)).await,
            ArchiveTask::Backward => self.navigate(self.grid.step(-1)).await,
            ArchiveTask::ForwardScan => self.navigate(self.grid.scan_step(1)).await,
            ArchiveTask::BackwardScan => self.navigate(self.grid.scan_step(-1)).await,
            ArchiveTask::Shutdown => {}
        }
    }

    /// Fetch (or re-symbol) the list anchored at `date_time`
    ///
    /// `list_request` rides on the `Table` reply and `load_request` on the
    /// sweep load that follows; without a load both end up on `Table`.
    async fn list(
        &mut self,
        list_request: Option<RequestId>,
        load_request: Option<RequestId>,
        date_time: NaiveDateTime,
        symbol: Product,
        mode: ListMode,
    ) {
        let date_time_string = date_time.format(LIST_FORMAT).to_string();
        info!(
            "List {} {} <- {} {} {:?}",
            self.pathway, date_time_string, self.grid.date_time_string, symbol, mode
        );

        // Same hour: only the product changes
        if date_time_string == self.grid.date_time_string && !self.grid.items.is_empty() {
            let load = self
                .grid
                .swap_symbol(symbol, mode)
                .and_then(|index| self.select(index));
            self.finish_list(list_request, load_request, load).await;
            return;
        }

        let listed = self
            .fetch(
                "list",
                self.catalog
                    .list(&self.pathway, &date_time_string, symbol.symbol()),
            )
            .await;
        let payload = match listed {
            Ok(payload) => payload,
            Err(e) => {
                warn!("List {} failed: {}", date_time_string, e);
                self.reply(list_request.or(load_request), WorkerResponse::Message(user_text(&e)))
                    .await;
                return;
            }
        };

        let selected = self
            .grid
            .index
            .and_then(|index| self.grid.items.get(index).cloned());
        let no_data = payload.hour < 0;
        self.grid
            .apply_list(date_time_string, symbol, mode, payload);
        if no_data {
            self.finish_list(list_request, load_request, None).await;
            self.reply(None, WorkerResponse::Message("No Data".into())).await;
            return;
        }

        // Growing the window keeps the selection where it is
        if matches!(mode, ListMode::Prepend | ListMode::Append) {
            let kept = selected.and_then(|item| self.grid.items.iter().position(|i| *i == item));
            if let Some(index) = kept {
                self.grid.index = Some(index);
                self.grid.revise_paths();
                self.finish_list(list_request, load_request, None).await;
                return;
            }
        }

        let load = self
            .grid
            .default_index()
            .and_then(|index| self.select(index));
        self.finish_list(list_request, load_request, load).await;
    }

    async fn finish_list(
        &mut self,
        list_request: Option<RequestId>,
        load_request: Option<RequestId>,
        load: Option<String>,
    ) {
        match load {
            Some(item) => {
                self.reply(list_request, self.table()).await;
                self.load(load_request, &item).await;
            }
            None => {
                self.reply(list_request.or(load_request), self.table())
                    .await
            }
        }
    }

    async fn neighbour(&mut self, request: RequestId, hours: i64) {
        let Some(date_time) = self.grid.date_time() else {
            let text = format!("No list at {}", self.grid.date_time_string);
            self.reply(Some(request), WorkerResponse::Message(text)).await;
            return;
        };
        let mode = if hours < 0 {
            ListMode::Prepend
        } else {
            ListMode::Append
        };
        let symbol = self.grid.symbol;
        self.list(Some(request), None, date_time + TimeDelta::hours(hours), symbol, mode)
            .await;
    }

    async fn load(&mut self, request: Option<RequestId>, name: &str) {
        debug!("Load {}/{}", self.pathway, name);
        let loaded = self.fetch("load", self.catalog.load(&self.pathway, name)).await;
        let response = match loaded {
            Ok(bytes) => match Sweep::decode(name, &bytes) {
                Ok(sweep) => {
                    self.grid.scan = sweep.scan.clone();
                    WorkerResponse::Load(Box::new(sweep))
                }
                Err(e) => {
                    warn!("{}", e);
                    WorkerResponse::Message(format!("Failed to load {name}"))
                }
            },
            Err(ArchiveError::Catalog { status, text }) => {
                info!("Load {} refused with {}", name, status);
                WorkerResponse::Reset(text)
            }
            Err(e) => {
                warn!("Load {} failed: {}", name, e);
                WorkerResponse::Message(format!("Failed to load {name}"))
            }
        };
        self.reply(request, response).await;
    }

    async fn month(&mut self, request: RequestId, day: NaiveDate) {
        let day_string = day.format("%Y%m01").to_string();
        info!("Month {} {}", self.pathway, day_string);
        match self.fetch("month", self.catalog.month(&self.pathway, &day_string)).await {
            Ok(days) => {
                self.grid.merge_days(days);
                let days = self.grid.days_active.clone();
                self.reply(Some(request), WorkerResponse::Month(days)).await;
            }
            Err(e) => {
                warn!("Month {} failed: {}", day_string, e);
                self.reply(Some(request), WorkerResponse::Message(user_text(&e)))
                    .await;
            }
        }
    }

    async fn navigate(&mut self, target: Option<usize>) {
        let Some(item) = target.and_then(|index| self.select(index)) else {
            return;
        };
        self.reply(None, self.index()).await;
        self.load(None, &item).await;
    }

    async fn toggle(&mut self, mode: UpdateRequest) {
        let next = mode.resolve(self.update);
        if mode != UpdateRequest::Auto && self.update == Some(next) {
            self.reply(
                None,
                WorkerResponse::State {
                    update: self.update,
                    message: None,
                },
            )
            .await;
            return;
        }
        info!("Live update {} <- {:?}", next, self.update);
        self.update = Some(next);
        if next == LiveUpdate::Offline {
            self.disconnect().await;
        } else {
            self.catchup().await;
        }
    }

    async fn catchup(&mut self) {
        info!("Catching up {}", self.pathway);
        let payload = match self.fetch("catchup", self.catalog.catchup(&self.pathway)).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Unable to catch up: {}", e);
                self.reply(None, WorkerResponse::Message("Unable to catch up".into()))
                    .await;
                return;
            }
        };
        self.grid.apply_catchup(payload);
        let target = match self.update {
            Some(LiveUpdate::Always) => self.grid.items.len().checked_sub(1),
            _ => self.grid.default_index(),
        };
        let load = target.and_then(|index| self.select(index));
        self.reply(None, self.table()).await;
        if let Some(item) = load {
            self.load(None, &item).await;
        }
        self.connect().await;
    }

    /// Open the live feed unless it is open already
    async fn connect(&mut self) {
        let update = self.update;
        let Some(mode) = update.filter(|u| *u != LiveUpdate::Offline) else {
            return;
        };
        if self.feed.is_some() {
            let message = Some(format!("Update mode to {mode}"));
            self.reply(None, WorkerResponse::State { update, message })
                .await;
            if mode == LiveUpdate::Always {
                self.navigate(self.grid.items.len().checked_sub(1)).await;
            }
            return;
        }

        self.retry = None;
        match self.fetch("feed", self.catalog.feed(&self.pathway)).await {
            Ok(feed) => {
                self.feed = Some(feed);
                let message = Some(format!("Connecting to {} stream ...", self.pathway));
                self.reply(None, WorkerResponse::State { update, message })
                    .await;
            }
            Err(e) => {
                warn!("Live feed for {} unavailable: {}", self.pathway, e);
                self.retry = Some(Instant::now() + self.config.feed_retry());
                self.reply(
                    None,
                    WorkerResponse::State {
                        update,
                        message: None,
                    },
                )
                .await;
            }
        }
    }

    async fn disconnect(&mut self) {
        self.retry = None;
        if self.feed.take().is_some() {
            info!("Live feed for {} closed", self.pathway);
        }
        self.reply(
            None,
            WorkerResponse::State {
                update: self.update,
                message: None,
            },
        )
        .await;
    }

    async fn feed_update(&mut self, payload: FeedPayload) {
        let mut target = None;
        for item in &payload.items {
            if let Some(index) = self.grid.add_live_item(item, self.update) {
                target = Some(index);
            }
        }
        self.grid.latest_hour = latest_hour_of(&payload.hours_active);
        self.grid.hours_active = payload.hours_active;
        let load = target.and_then(|index| self.select(index));
        self.reply(None, self.table()).await;
        if let Some(item) = load {
            self.load(None, &item).await;
        }
    }

    fn feed_lost(&mut self) {
        self.feed = None;
        if matches!(self.update, Some(LiveUpdate::Scan | LiveUpdate::Always)) {
            info!(
                "Live feed for {} lost, reloading in {:?}",
                self.pathway,
                self.config.feed_retry()
            );
            self.retry = Some(Instant::now() + self.config.feed_retry());
        }
    }
}

async fn next_feed(feed: &mut Option<mpsc::Receiver<FeedPayload>>) -> Option<FeedPayload> {
    match feed {
        Some(feed) => feed.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Run the archive worker until `Shutdown` or the task channel closes
pub async fn run_archive_worker<C: Catalog>(
    catalog: C,
    config: ArchiveConfig,
    mut task_rx: mpsc::Receiver<ArchiveTask>,
    reply_tx: mpsc::Sender<WorkerReply>,
) {
    let mut worker = ArchiveWorker {
        catalog,
        config,
        reply_tx,
        pathway: String::new(),
        grid: Grid::default(),
        update: None,
        feed: None,
        retry: None,
    };
    info!("Archive worker started");

    loop {
        tokio::select! {
            task = task_rx.recv() => {
                let Some(task) = task else { break; };
                if task == ArchiveTask::Shutdown {
                    info!("Archive worker shutting down");
                    break;
                }
                worker.handle(task).await;
            }

            payload = next_feed(&mut worker.feed) => match payload {
                Some(payload) => worker.feed_update(payload).await,
                None => worker.feed_lost(),
            },

            _ = sleep_until_opt(worker.retry) => {
                worker.retry = None;
                worker.reply(None, WorkerResponse::Reload).await;
            }
        }
    }

    info!("Archive worker stopped");
}
