//! Periodic feed reloads
//!
//! One task owns the reload schedule. Each reload reads the feed on the
//! blocking pool and publishes through `Store::refresh_from_feed`, which also
//! serializes concurrent refreshes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::feed::{FeedError, FeedReader};
use crate::store::{RefreshReport, Store};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("reload task did not complete: {0}")]
    Aborted(#[from] JoinError),
}

pub struct Refresher {
    store: Arc<Store>,
    feed_path: PathBuf,
    interval: Duration,
}

impl Refresher {
    pub fn new(store: Arc<Store>, feed_path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            store,
            feed_path: feed_path.into(),
            interval,
        }
    }

    /// Read the feed once and publish it. On error the live snapshot is untouched.
    pub async fn refresh_once(&self) -> Result<RefreshReport, RefreshError> {
        let store = Arc::clone(&self.store);
        let path = self.feed_path.clone();
        let started = Instant::now();

        let report = tokio::task::spawn_blocking(move || -> Result<RefreshReport, FeedError> {
            let mut feed = FeedReader::open(&path)?;
            store.refresh_from_feed(&mut feed)
        })
        .await??;

        info!(
            "Loaded {} promotions from {} in {:?}",
            report.records,
            self.feed_path.display(),
            started.elapsed()
        );
        Ok(report)
    }

    /// First load at startup. The caller treats failure as fatal since
    /// there is nothing to serve yet.
    pub async fn initial_load(&self) -> Result<RefreshReport, RefreshError> {
        info!("Loading promotions from {}", self.feed_path.display());
        self.refresh_once().await
    }

    /// Reload on every interval tick until `shutdown` is cancelled.
    ///
    /// A failed reload is logged and the previous snapshot keeps serving. A
    /// reload already running when shutdown arrives is allowed to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Reloading {} every {:?}", self.feed_path.display(), self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.refresh_once().await {
                error!(
                    "Reload failed, still serving generation {}: {}",
                    self.store.snapshot().generation(),
                    e
                );
            }
        }

        info!("Refresher stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
