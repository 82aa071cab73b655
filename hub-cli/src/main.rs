//! RadarHub - headless client for radar hubs and their archives

mod archive;
mod live;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hub_archive::UpdateRequest;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

#[derive(Parser)]
#[command(name = "radarhub")]
#[command(about = "Follow a radar hub live or browse its archive from the terminal")]
#[command(version)]
struct Cli {
    /// Hub host (overrides the settings file)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Use plain ws/http instead of wss/https
    #[arg(long, global = true)]
    insecure: bool,

    /// Serve everything from the built-in simulator
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a radar and log what it streams
    Live {
        /// Radar to follow
        #[arg(long)]
        pathway: Option<String>,

        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        seconds: Option<u64>,

        /// Render ticks per second; each tick drains the ray buffer
        #[arg(long, default_value = "60")]
        fps: u32,

        /// Control commands to send once connected, e.g. "t y"
        #[arg(long = "execute")]
        commands: Vec<String>,
    },

    /// Load an hour of the archive, step through it and print the list
    Archive {
        /// Radar to browse
        #[arg(long)]
        pathway: Option<String>,

        /// Day as YYYYMMDD (latest data when omitted)
        #[arg(long)]
        day: Option<String>,

        /// Hour of `day`
        #[arg(long, default_value = "0")]
        hour: u32,

        /// Items to step after loading; negative steps backwards
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        steps: i32,

        /// Step within the current scan only
        #[arg(long)]
        by_scan: bool,

        /// Live-update mode: offline, scan, always or auto
        #[arg(long)]
        live_update: Option<UpdateRequest>,
    },

    /// Write the current settings to the settings file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "radarhub=info,hub_protocol=info,hub_ingest=info,hub_archive=info,hub_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if cli.insecure {
        settings.secure = false;
    }

    match cli.command {
        Commands::Live {
            pathway,
            seconds,
            fps,
            commands,
        } => {
            let pathway = pathway.unwrap_or_else(|| settings.pathway.clone());
            let options = live::LiveOptions {
                pathway,
                seconds,
                fps,
                commands,
            };
            live::run(&settings, cli.simulate, options).await
        }
        Commands::Archive {
            pathway,
            day,
            hour,
            steps,
            by_scan,
            live_update,
        } => {
            let pathway = pathway.unwrap_or_else(|| settings.pathway.clone());
            let options = archive::ArchiveOptions {
                pathway,
                day,
                hour,
                steps,
                by_scan,
                live_update,
            };
            archive::run(&settings, cli.simulate, options).await
        }
        Commands::Init => {
            let path = settings.save()?;
            println!("Settings written to {}", path.display());
            Ok(())
        }
    }
}
