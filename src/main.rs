mod api;
mod config;
mod feed;
mod refresher;
mod server;
mod store;
mod util;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, LogConfig};
use refresher::Refresher;
use server::Server;
use store::Store;

/// Serve promotion lookups from a periodically reloaded feed
#[derive(Debug, Parser)]
#[command(name = "promodb", version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Feed file, overrides `feed.path`
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Listening address, overrides `server.addr`
    #[arg(long)]
    addr: Option<String>,

    /// Seconds between reloads, overrides `feed.reload_interval_secs`
    #[arg(long)]
    reload_interval: Option<u64>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(feed) = self.feed {
            config.feed.path = feed;
        }
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(secs) = self.reload_interval {
            config.feed.reload_interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .with_context(|| format!("invalid log level '{}'", log.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match &log.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    init_logging(&config.log)?;

    info!("Starting promodb");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(Store::with_key_policy(config.feed.key_policy));
    info!("Key policy: {:?}", store.key_policy());
    let refresher = Refresher::new(
        Arc::clone(&store),
        config.feed.path.clone(),
        config.feed.reload_interval(),
    );

    // Without a first snapshot there is nothing to serve.
    refresher
        .initial_load()
        .await
        .context("initial promotion load failed")?;
    if store.snapshot().is_empty() {
        warn!("Feed {} contained no valid promotions", config.feed.path.display());
    }

    let server = Server::bind(&config.server, Arc::clone(&store)).await?;
    info!("Server listening on: {}", server.local_addr());

    let shutdown = CancellationToken::new();
    let refresher_task = refresher.spawn(shutdown.clone());
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();

    let drain = async {
        let _ = server_task.await;
        let _ = refresher_task.await;
    };
    if tokio::time::timeout(Duration::from_secs(30), drain).await.is_err() {
        error!("Timed out waiting for background tasks to stop");
    }

    info!("promodb stopped");
    Ok(())
}
