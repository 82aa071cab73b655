//! `radarhub archive`

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use hub_archive::{parse_day, Archive, ArchiveEvent, HttpCatalog, LiveUpdate, UpdateRequest};
use hub_sim::{MemoryCatalog, MemoryCatalogConfig};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::settings::Settings;

/// Longest wait for the engine to answer one step
const STEP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ArchiveOptions {
    pub pathway: String,
    pub day: Option<String>,
    pub hour: u32,
    pub steps: i32,
    pub by_scan: bool,
    pub live_update: Option<UpdateRequest>,
}

pub async fn run(settings: &Settings, simulate: bool, options: ArchiveOptions) -> Result<()> {
    let mut config = settings.archive_config();
    if options.day.is_some() {
        // A fixed hour is browsed offline
        config.live_update = LiveUpdate::Offline;
    }
    let archive = if simulate {
        Archive::spawn(MemoryCatalog::new(MemoryCatalogConfig::default()), config)
    } else {
        Archive::spawn(HttpCatalog::new(settings.origin()), config)
    };
    browse(archive, options).await
}

/// Pump events until `pred` holds; fails on watchdog expiry or timeout
async fn wait_for<F>(archive: &mut Archive, what: &str, mut pred: F) -> Result<ArchiveEvent>
where
    F: FnMut(&ArchiveEvent) -> bool,
{
    let waited = timeout(STEP_TIMEOUT, async {
        while let Some(event) = archive.next().await {
            match &event {
                ArchiveEvent::Watchdog(kind) => {
                    bail!("{} request went unanswered", kind.name());
                }
                ArchiveEvent::Message(text) | ArchiveEvent::Reset(text) => info!("{}", text),
                _ => {}
            }
            if pred(&event) {
                return Ok(event);
            }
        }
        Err(anyhow!("Archive worker stopped"))
    })
    .await;
    waited.with_context(|| format!("Timed out waiting for {what}"))?
}

async fn browse(mut archive: Archive, options: ArchiveOptions) -> Result<()> {
    archive.init(options.pathway.as_str())?;
    wait_for(&mut archive, "initial state", |e| matches!(e, ArchiveEvent::State(_))).await?;

    if let Some(day) = &options.day {
        let day = parse_day(day)?;
        archive.table(day, options.hour)?;
        let event = wait_for(&mut archive, "item list", |e| {
            matches!(
                e,
                ArchiveEvent::Sweep | ArchiveEvent::Message(_) | ArchiveEvent::Reset(_)
            )
        })
        .await?;
        if let ArchiveEvent::Message(text) | ArchiveEvent::Reset(text) = event {
            bail!("Unable to list {} hour {}: {}", day, options.hour, text);
        }
    }

    if let Some(mode) = options.live_update {
        archive.toggle_live_update(mode)?;
        wait_for(&mut archive, "live update", |e| matches!(e, ArchiveEvent::State(_))).await?;
    }

    for _ in 0..options.steps.unsigned_abs() {
        if !step(&mut archive, options.steps > 0, options.by_scan).await? {
            warn!("Reached the end of the list");
            break;
        }
    }

    archive.update_age();
    print_grid(&archive);
    archive.shutdown().await;
    Ok(())
}

/// Move one item; false when there is nowhere to go
async fn step(archive: &mut Archive, forward: bool, by_scan: bool) -> Result<bool> {
    let Some(grid) = archive.grid() else {
        return Ok(false);
    };
    // backward-scan, backward, forward, forward-scan
    let slot = match (forward, by_scan) {
        (false, true) => 0,
        (false, false) => 1,
        (true, false) => 2,
        (true, true) => 3,
    };
    if !grid.paths_active[slot] {
        return Ok(false);
    }
    match (forward, by_scan) {
        (false, true) => archive.navigate_backward_scan()?,
        (false, false) => archive.navigate_backward()?,
        (true, false) => archive.navigate_forward()?,
        (true, true) => archive.navigate_forward_scan()?,
    }
    wait_for(archive, "sweep", |e| {
        matches!(e, ArchiveEvent::Sweep | ArchiveEvent::Reset(_))
    })
    .await?;
    Ok(true)
}

fn print_grid(archive: &Archive) {
    let Some(grid) = archive.grid() else {
        println!("No data");
        return;
    };
    let rows = archive
        .view()
        .window()
        .rows(grid.items.len(), archive.view().params());
    println!(
        "{}  {} items  hour {}  live update {}",
        grid.date_time_string,
        grid.items.len(),
        grid.hour.map_or_else(|| "-".to_string(), |h| h.to_string()),
        archive
            .live_update()
            .map_or_else(|| "-".to_string(), |u| u.to_string()),
    );
    let ages = archive.ages();
    for (k, index) in rows.enumerate() {
        let marker = if grid.index == Some(index) { ">" } else { " " };
        let age = ages.get(k).map_or("", String::as_str);
        println!("{} {:4}  {}  {}", marker, index, grid.items[index], age);
    }
    if let Some(sweep) = archive.sweep() {
        println!("{}", sweep.title_string);
        if !sweep.info_string.is_empty() {
            println!("{}", sweep.info_string);
        }
    }
}
