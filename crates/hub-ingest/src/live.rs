//! Live ingest session
//!
//! The session is split in two halves that only talk through channels:
//!
//! - [`run_live_worker`] owns the socket. It decodes frames, runs the
//!   reconnect countdown and emits [`LiveEvent`]s.
//! - [`Live`] is the UI-side handle. It folds events into displayable state
//!   and keeps decoded rays in a [`RingBuffer`] until the renderer takes them.
//!
//! # Connection Lifecycle
//!
//! ```text
//! disconnected -> connecting -> connected -> (close/error) -> countdown -> connecting
//! ```
//!
//! Errors and normal closes take the same path. Only an explicit
//! `disconnect()` stops the countdown.
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_ingest::{Live, LiveConfig, WsConnector};
//!
//! let mut live = Live::spawn(WsConnector, LiveConfig::default());
//! live.connect("wss://radarhub.arrc.ou.edu/ws/px1000/", "px1000").await?;
//! while let Some(event) = live.next().await {
//!     while let Ok(ray) = live.dequeue_ray() {
//!         // draw ray
//!     }
//! }
//! ```

use std::future::pending;

use hub_protocol::frame::{ControlItem, HealthFrame};
use hub_protocol::{Command, Frame, FrameDecoder, RayRecord, Response, ScopeChannels};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::LiveConfig;
use crate::error::{IngestError, RingError};
use crate::events::LiveEvent;
use crate::reconnect::{ReconnectStep, ReconnectTimer};
use crate::ring::RingBuffer;
use crate::session::SessionCore;
use crate::transport::{Connector, Link, LinkEvent};

/// Commands sent to the live worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveCommand {
    /// Open a socket to `url` and subscribe to `pathway`
    Connect { url: String, pathway: String },
    /// Send a user control action; dropped when not connected
    Execute { payload: String },
    /// Close the socket without reconnecting
    Disconnect,
    /// Stop the worker
    Shutdown,
}

struct Countdown {
    timer: ReconnectTimer,
    ticks: Interval,
}

struct LiveWorker<C> {
    connector: C,
    config: LiveConfig,
    event_tx: mpsc::Sender<LiveEvent>,
    /// Where to (re)connect; `None` after an explicit disconnect
    target: Option<(String, String)>,
    decoder: FrameDecoder,
    link: Option<Link>,
    countdown: Option<Countdown>,
}

impl<C: Connector> LiveWorker<C> {
    async fn emit(&self, event: LiveEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn open(&mut self) {
        let Some((url, pathway)) = self.target.clone() else {
            return;
        };
        self.emit(LiveEvent::Message("Connecting ...".into())).await;
        info!("Connecting to {} for pathway {}", url, pathway);

        match self.connector.connect(&url).await {
            Ok(link) => {
                let greet = Command::greet(&pathway).to_json();
                if link.outgoing.send(greet).await.is_err() {
                    warn!("Link to {} closed before greeting", url);
                    self.closed().await;
                    return;
                }
                self.decoder.reset();
                self.link = Some(link);
                self.emit(LiveEvent::Message("Hub Connected".into())).await;
                self.emit(LiveEvent::Connected).await;
            }
            Err(e) => {
                warn!("{}", e);
                self.closed().await;
            }
        }
    }

    /// Socket gone: report it and start the countdown unless disconnected on purpose
    async fn closed(&mut self) {
        let was_open = self.link.take().is_some();
        if was_open {
            self.emit(LiveEvent::Disconnected).await;
        }
        self.emit(LiveEvent::Message("No connection".into())).await;
        if self.target.is_some() {
            let step = self.config.reconnect_step();
            let mut ticks = interval_at(Instant::now() + step, step);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.countdown = Some(Countdown {
                timer: ReconnectTimer::start(&self.config),
                ticks,
            });
        }
    }

    async fn tick(&mut self) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        match countdown.timer.tick() {
            ReconnectStep::Wait { message, .. } => {
                if let Some(message) = message {
                    self.emit(LiveEvent::Message(message)).await;
                }
            }
            ReconnectStep::Connect => {
                self.countdown = None;
                self.open().await;
            }
        }
    }

    async fn incoming(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Message(data) => match self.decoder.decode(&data) {
                Ok(Some(frame)) => self.dispatch(frame).await,
                Ok(None) => {}
                Err(e) => warn!("Dropping malformed frame: {}", e),
            },
            LinkEvent::Error(e) => {
                // Close and take the normal reconnect path
                warn!("Socket error: {}", e);
                self.closed().await;
            }
            LinkEvent::Closed => {
                info!("Socket closed");
                self.closed().await;
            }
        }
    }

    async fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Control(control) => self.emit(LiveEvent::Control(control.control)).await,
            Frame::Health(health) => self.emit(LiveEvent::Health(health)).await,
            Frame::Scope(scope) => self.emit(LiveEvent::Scope(scope)).await,
            Frame::Response(response) => self.emit(LiveEvent::Response(response)).await,
            Frame::Ray { ray, skip } => {
                if let Some(skip) = skip {
                    self.emit(LiveEvent::RaySkip(skip)).await;
                }
                self.emit(LiveEvent::Ray(ray)).await;
            }
        }
    }

    async fn execute(&self, payload: String) {
        let (Some(link), Some((_, pathway))) = (&self.link, &self.target) else {
            debug!("Not connected, dropping command {}", payload);
            return;
        };
        let json = Command::message(pathway, payload).to_json();
        if link.outgoing.send(json).await.is_err() {
            debug!("Link closed while sending command");
        }
    }

    async fn disconnect(&mut self) {
        self.target = None;
        self.countdown = None;
        if self.link.take().is_some() {
            info!("Disconnected on request");
            self.emit(LiveEvent::Disconnected).await;
        }
    }
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.incoming.recv().await.unwrap_or(LinkEvent::Closed),
        None => pending().await,
    }
}

async fn next_tick(countdown: &mut Option<Countdown>) {
    match countdown {
        Some(countdown) => {
            countdown.ticks.tick().await;
        }
        None => pending().await,
    }
}

/// Run the live worker until `Shutdown` or the command channel closes
pub async fn run_live_worker<C: Connector>(
    connector: C,
    config: LiveConfig,
    mut cmd_rx: mpsc::Receiver<LiveCommand>,
    event_tx: mpsc::Sender<LiveEvent>,
) {
    let mut worker = LiveWorker {
        connector,
        config,
        event_tx,
        target: None,
        decoder: FrameDecoder::new(""),
        link: None,
        countdown: None,
    };
    info!("Live worker started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    LiveCommand::Connect { url, pathway } => {
                        if worker.link.take().is_some() {
                            worker.emit(LiveEvent::Disconnected).await;
                        }
                        worker.countdown = None;
                        if worker.decoder.pathway() != pathway {
                            worker.decoder.set_pathway(pathway.as_str());
                        }
                        worker.target = Some((url, pathway));
                        worker.open().await;
                    }
                    LiveCommand::Execute { payload } => worker.execute(payload).await,
                    LiveCommand::Disconnect => worker.disconnect().await,
                    LiveCommand::Shutdown => {
                        info!("Live worker shutting down");
                        break;
                    }
                }
            }

            event = next_link_event(&mut worker.link) => worker.incoming(event).await,

            _ = next_tick(&mut worker.countdown) => worker.tick().await,
        }
    }

    info!("Live worker stopped");
}

/// UI-side handle of a live session
pub struct Live {
    cmd_tx: mpsc::Sender<LiveCommand>,
    event_rx: mpsc::Receiver<LiveEvent>,
    worker: JoinHandle<()>,
    core: SessionCore,
    rays: RingBuffer<RayRecord>,
    health: Option<HealthFrame>,
    control: Vec<ControlItem>,
    scope: Option<ScopeChannels>,
    connected: bool,
    skips: u64,
}

impl Live {
    /// Spawn a worker on the current tokio runtime
    pub fn spawn<C: Connector>(connector: C, config: LiveConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_depth.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.channel_depth.max(1));
        let core = SessionCore::new(config.message_lifetime(), config.response_lifetime());
        let rays = RingBuffer::new(config.ray_capacity);
        let worker = tokio::spawn(run_live_worker(connector, config, cmd_rx, event_tx));
        Self {
            cmd_tx,
            event_rx,
            worker,
            core,
            rays,
            health: None,
            control: Vec::new(),
            scope: None,
            connected: false,
            skips: 0,
        }
    }

    async fn send(&self, cmd: LiveCommand) -> Result<(), IngestError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| IngestError::WorkerGone)
    }

    /// Connect to `url` for `pathway`
    pub async fn connect(&self, url: impl Into<String>, pathway: impl Into<String>) -> Result<(), IngestError> {
        self.send(LiveCommand::Connect {
            url: url.into(),
            pathway: pathway.into(),
        })
        .await
    }

    /// Send a control action; silently dropped by the worker when not connected
    pub async fn execute(&self, payload: impl Into<String>) -> Result<(), IngestError> {
        self.send(LiveCommand::Execute {
            payload: payload.into(),
        })
        .await
    }

    /// Close the socket and stay disconnected
    pub async fn disconnect(&self) -> Result<(), IngestError> {
        self.send(LiveCommand::Disconnect).await
    }

    /// Stop the worker and wait for it
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(LiveCommand::Shutdown).await;
        let _ = self.worker.await;
    }

    /// Wait for the next worker event and fold it into state
    ///
    /// Expired messages and toasts are cleared while waiting. Returns `None`
    /// once the worker has stopped.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        loop {
            let deadline = self.core.next_deadline();
            tokio::select! {
                event = self.event_rx.recv() => {
                    let event = event?;
                    self.apply(&event, Instant::now());
                    return Some(event);
                }
                _ = sleep_until_opt(deadline) => {
                    self.core.expire(Instant::now());
                }
            }
        }
    }

    /// Fold one event into state
    pub fn apply(&mut self, event: &LiveEvent, now: Instant) {
        match event {
            LiveEvent::Message(text) => self.core.show_message(text.clone(), now),
            LiveEvent::Connected => {
                self.connected = true;
                self.core.bump();
            }
            LiveEvent::Disconnected => {
                self.connected = false;
                self.core.bump();
            }
            LiveEvent::Health(health) => {
                self.health = Some(health.clone());
                self.core.bump();
            }
            LiveEvent::Control(control) => {
                self.control = control.clone();
                self.core.bump();
            }
            LiveEvent::Scope(scope) => {
                self.scope = Some(scope.clone());
                self.core.bump();
            }
            LiveEvent::Ray(ray) => self.rays.enqueue(ray.clone()),
            LiveEvent::RaySkip(_) => self.skips += 1,
            LiveEvent::Response(response) => self.core.show_response(response.clone(), now),
        }
    }

    /// Take the oldest pending ray (called once per render frame per row)
    pub fn dequeue_ray(&mut self) -> Result<RayRecord, RingError> {
        self.rays.dequeue()
    }

    pub fn rays(&self) -> &RingBuffer<RayRecord> {
        &self.rays
    }

    pub fn message(&self) -> &str {
        self.core.message()
    }

    pub fn response(&self) -> Option<&Response> {
        self.core.response()
    }

    pub fn health(&self) -> Option<&HealthFrame> {
        self.health.as_ref()
    }

    pub fn control(&self) -> &[ControlItem] {
        &self.control
    }

    pub fn scope(&self) -> Option<&ScopeChannels> {
        self.scope.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Ray counter jumps seen this session
    pub fn skips(&self) -> u64 {
        self.skips
    }

    pub fn tic(&self) -> u64 {
        self.core.tic()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
