mod migrations;
mod server;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use nightfall_core::{
    bootstrap::{init_database, init_services, load_config},
    logging,
    playback::StreamUrls,
};

use server::NightfallServer;
use watch::WatchOptions;

#[derive(Parser, Debug)]
#[command(name = "nightfall")]
#[command(about = "Nightfall live DJ streaming companion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Play a stream and keep reconnecting while it is live
    Watch {
        /// HLS playback URL (`.../live/<key>/index.m3u8`)
        url: String,
        /// DJ set the listener is attending
        #[arg(long, env = "NIGHTFALL_STREAM_ID")]
        stream_id: Option<String>,
        /// Listener identity for presence tracking
        #[arg(long, env = "NIGHTFALL_VIEWER_ID")]
        viewer_id: Option<String>,
        /// Track presence in memory instead of Postgres
        #[arg(long)]
        offline: bool,
    },
    /// Generate a stream key and print its publish/playback URLs
    Key,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;
    logging::init_logging(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Watch {
            url,
            stream_id,
            viewer_id,
            offline,
        } => {
            watch::run_watch(
                &config,
                WatchOptions {
                    url,
                    stream_id,
                    viewer_id,
                    offline,
                },
            )
            .await
        }
        Command::Key => {
            let endpoints = StreamUrls::from(&config.streaming).new_endpoints();
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
            Ok(())
        }
    }
}

async fn serve(config: nightfall_core::Config) -> Result<()> {
    info!("Nightfall server starting...");
    info!("HTTP address: {}", config.http_address());

    let pool = init_database(&config).await?;
    migrations::run_migrations(&pool).await?;

    let services = init_services(pool, &config).await?;
    NightfallServer::new(config, services).start().await
}
