//! Virtual radar actor task and in-process connector
//!
//! [`run_virtual_radar`] owns a [`VirtualRadar`] and serves one link: it
//! answers client text, streams frames on a timer once greeted, and obeys
//! [`SimCommand`]s broadcast by the [`SimConnector`] that opened it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hub_ingest::{Connector, Link, LinkEvent, TransportError};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::radar::{VirtualRadar, VirtualRadarConfig};

/// Commands broadcast to every open virtual radar link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommand {
    /// Close the socket from the hub side (the client may reconnect)
    DropLink,
    /// Stop streaming and close
    Shutdown,
}

/// Send everything the radar has queued; false once the client is gone
async fn flush(radar: &mut VirtualRadar, push: &mpsc::Sender<LinkEvent>) -> bool {
    while let Some(bytes) = radar.take_output() {
        if push.send(LinkEvent::Message(bytes)).await.is_err() {
            return false;
        }
    }
    true
}

/// Run the virtual radar actor task
///
/// `sent` carries the client's outbound text and `push` the hub's messages.
/// The task ends when the client drops its link or a command closes it; a
/// `Closed` event is pushed on the way out.
pub async fn run_virtual_radar(
    mut radar: VirtualRadar,
    mut sent: mpsc::Receiver<String>,
    push: mpsc::Sender<LinkEvent>,
    mut cmd_rx: broadcast::Receiver<SimCommand>,
) {
    info!("Starting virtual radar for {}", radar.pathway());
    let mut frames = interval(radar.frame_period());
    frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut commands_open = true;

    radar.open();
    if !flush(&mut radar, &push).await {
        return;
    }

    loop {
        tokio::select! {
            text = sent.recv() => {
                let Some(text) = text else {
                    debug!("Client dropped link to virtual radar {}", radar.pathway());
                    break;
                };
                radar.handle_text(&text);
                if !flush(&mut radar, &push).await {
                    break;
                }
            }

            _ = frames.tick(), if radar.is_streaming() => {
                radar.step();
                if !flush(&mut radar, &push).await {
                    break;
                }
            }

            cmd = cmd_rx.recv(), if commands_open => match cmd {
                Ok(cmd) => {
                    info!("Virtual radar {} got {:?}", radar.pathway(), cmd);
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Virtual radar missed {} commands", n);
                }
                Err(broadcast::error::RecvError::Closed) => commands_open = false,
            },
        }
    }

    let _ = push.send(LinkEvent::Closed).await;
    info!("Virtual radar task ended for {}", radar.pathway());
}

/// Pathway named by a socket URL (`.../ws/<pathway>/`)
pub fn pathway_from_url(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|p| !p.is_empty() && !p.contains(':'))
}

/// Connector that serves every link from a fresh in-process virtual radar
#[derive(Debug, Clone)]
pub struct SimConnector {
    config: VirtualRadarConfig,
    commands: broadcast::Sender<SimCommand>,
    connections: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl SimConnector {
    pub fn new(config: VirtualRadarConfig) -> Self {
        let (commands, _) = broadcast::channel(16);
        Self {
            config,
            commands,
            connections: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Links opened so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Close every open link from the hub side
    pub fn drop_links(&self) {
        let _ = self.commands.send(SimCommand::DropLink);
    }

    /// Refuse (or accept again) new connections
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Default for SimConnector {
    fn default() -> Self {
        Self::new(VirtualRadarConfig::default())
    }
}

impl Connector for SimConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: url.to_string(),
                message: "simulated hub refused".into(),
            });
        }
        self.connections.fetch_add(1, Ordering::SeqCst);

        let mut config = self.config.clone();
        if let Some(pathway) = pathway_from_url(url) {
            config.pathway = pathway.to_string();
        }
        let (link, sent, push) = Link::pair();
        tokio::spawn(run_virtual_radar(
            VirtualRadar::new(config),
            sent,
            push,
            self.commands.subscribe(),
        ));
        Ok(link)
    }
}
