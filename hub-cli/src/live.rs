//! `radarhub live`

use std::time::Duration;

use anyhow::{bail, Result};
use hub_ingest::{socket_url, Live, LiveEvent, WsConnector};
use hub_sim::SimConnector;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::settings::Settings;

pub struct LiveOptions {
    pub pathway: String,
    pub seconds: Option<u64>,
    pub fps: u32,
    pub commands: Vec<String>,
}

pub async fn run(settings: &Settings, simulate: bool, options: LiveOptions) -> Result<()> {
    let live = if simulate {
        Live::spawn(SimConnector::default(), settings.live.clone())
    } else {
        Live::spawn(WsConnector, settings.live.clone())
    };
    let host = if simulate { "sim" } else { settings.host.as_str() };
    let url = socket_url(host, settings.secure && !simulate, &options.pathway);
    live.connect(url, options.pathway.clone()).await?;
    follow(live, options).await
}

async fn follow(mut live: Live, options: LiveOptions) -> Result<()> {
    let mut render = interval(Duration::from_secs_f64(1.0 / f64::from(options.fps.max(1))));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(Duration::from_secs(1));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let seconds = options.seconds;
    let stop = async move {
        match seconds {
            Some(s) => sleep(Duration::from_secs(s)).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot wait for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut pending = options.commands.into_iter();
    let mut drawn = 0usize;
    let mut last_report = Instant::now();

    loop {
        tokio::select! {
            event = live.next() => {
                let Some(event) = event else {
                    bail!("Live worker stopped");
                };
                match event {
                    LiveEvent::Message(text) => info!("{}", text),
                    LiveEvent::Connected => {
                        for command in pending.by_ref() {
                            info!("Executing {:?}", command);
                            live.execute(command).await?;
                        }
                    }
                    LiveEvent::Disconnected => info!("Disconnected"),
                    LiveEvent::Control(control) => {
                        let labels: Vec<&str> = control.iter().map(|c| c.label.as_str()).collect();
                        info!("Controls: {}", labels.join(", "));
                    }
                    LiveEvent::Health(health) => debug!("Health {}", health.json()),
                    LiveEvent::Scope(scope) => debug!("Scope {} samples", scope.count),
                    LiveEvent::Response(response) => info!("{}", response),
                    LiveEvent::RaySkip(_) | LiveEvent::Ray(_) => {}
                }
            }

            _ = render.tick() => {
                while let Ok(ray) = live.dequeue_ray() {
                    if ray.clear {
                        debug!("Sweep begins at {}", ray.label());
                    }
                    drawn += 1;
                }
            }

            _ = report.tick() => {
                let elapsed = last_report.elapsed().as_secs_f64();
                if drawn > 0 && elapsed > 0.0 {
                    info!(
                        "{:.1} rays/s, {} overwritten",
                        drawn as f64 / elapsed,
                        live.rays().overwritten()
                    );
                }
                drawn = 0;
                last_report = Instant::now();
            }

            _ = &mut stop => break,
        }
    }

    live.disconnect().await?;
    live.shutdown().await;
    Ok(())
}
