//! Zone document fetching and periodic refresh.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::snapshot::SnapshotStore;
use crate::zone::{LoadMode, LoadStats, ZoneDocument, ZoneStore, load_document};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to fetch zones: {0}")]
    Fetch(String),
    #[error("HTTP error {0} fetching zones")]
    Status(u16),
    #[error("Error parsing JSON zones file: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, RefreshError>;

/// Loads zone documents into the store and keeps the snapshot in step.
pub struct ZoneRefresher {
    zones_url: String,
    client: reqwest::Client,
    zone_store: Arc<ZoneStore>,
    snapshot: Option<SnapshotStore>,
    /// Serializes loads so a refresh and a push never interleave their
    /// store and snapshot writes
    load_lock: Mutex<()>,
}

impl ZoneRefresher {
    pub fn new(
        zones_url: &str,
        fetch_timeout: Duration,
        zone_store: Arc<ZoneStore>,
        snapshot: Option<SnapshotStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("zoneagent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RefreshError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            zones_url: zones_url.to_string(),
            client,
            zone_store,
            snapshot,
            load_lock: Mutex::new(()),
        })
    }

    pub fn zone_store(&self) -> &Arc<ZoneStore> {
        &self.zone_store
    }

    /// Download and decode the zone document.
    pub async fn fetch_document(&self) -> Result<ZoneDocument> {
        debug!("Fetching zones from {}", self.zones_url);
        let response = self
            .client
            .get(&self.zones_url)
            .send()
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RefreshError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::Fetch(format!("failed to read response: {}", e)))?;

        serde_json::from_slice(&body).map_err(|e| RefreshError::Parse(e.to_string()))
    }

    /// Fetch the document and replace the whole store with it. On failure
    /// the store is left as it was.
    pub async fn refresh(&self) -> Result<LoadStats> {
        let document = self.fetch_document().await?;
        let _guard = self.load_lock.lock().await;
        let stats = load_document(&self.zone_store, &document, LoadMode::FullReplace);
        self.persist(document, true).await;
        Ok(stats)
    }

    /// Apply a pushed document to the apexes it names.
    pub async fn apply_push(&self, document: ZoneDocument) -> LoadStats {
        let _guard = self.load_lock.lock().await;
        let stats = load_document(&self.zone_store, &document, LoadMode::Partial);
        self.persist(document, false).await;
        stats
    }

    /// Load whatever the snapshot holds, ahead of the first live fetch.
    pub async fn seed_from_snapshot(&self) -> Option<LoadStats> {
        let snapshot = self.snapshot.clone()?;
        match tokio::task::spawn_blocking(move || snapshot.read_zones()).await {
            Ok(Ok(document)) if !document.is_empty() => {
                let _guard = self.load_lock.lock().await;
                Some(load_document(&self.zone_store, &document, LoadMode::Partial))
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                error!("Failed to read zone snapshot: {}", e);
                None
            }
            Err(e) => {
                error!("Snapshot read task failed: {}", e);
                None
            }
        }
    }

    async fn persist(&self, document: ZoneDocument, flush: bool) {
        let Some(snapshot) = self.snapshot.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || snapshot.write_zones(&document, flush)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to write zone snapshot: {}", e),
            Err(e) => error!("Snapshot write task failed: {}", e),
        }
    }

    /// Refresh every `period` until shutdown. Failures keep the current data.
    pub async fn run_periodic(
        self: Arc<Self>,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; startup has just loaded
        ticker.tick().await;

        info!("Starting zone refresh every {:?}", period);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Zone refresher received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(stats) => info!("Periodic zone refresh complete: {}", stats),
                        Err(e) => error!("Periodic zone refresh failed, keeping current zones: {}", e),
                    }
                }
            }
        }
    }
}
