use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zoneagent::{
    config::{DnsConfig, parse_optional_addr, parse_socket_addr},
    error::ConfigError,
    forwarder::Forwarder,
    handler::DnsHandler,
    http_server::HttpServer,
    refresh::ZoneRefresher,
    server::{Deadlines, Listeners, run_dns_server},
    snapshot::SnapshotStore,
    zone::ZoneStore,
};

/// Authoritative DNS server for zones published as a JSON document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the DNS listeners (ip or ip:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Control plane address, or "disabled"
    #[arg(long)]
    http_listen: Option<String>,

    /// URL of the JSON zone document
    #[arg(short, long)]
    zones: Option<String>,

    /// Upstream server for queries outside our zones, or "disabled"
    #[arg(short, long)]
    recurse: Option<String>,

    /// Control plane key
    #[arg(short, long)]
    key: Option<String>,

    /// Snapshot database path, or "disabled"
    #[arg(long)]
    snapshot: Option<String>,

    /// Seconds between background refreshes (0 disables them)
    #[arg(long)]
    refresh_interval: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut DnsConfig) -> Result<(), ConfigError> {
        if let Some(listen) = self.listen {
            config.bind_addr =
                parse_socket_addr(&listen, 53).ok_or(ConfigError::InvalidBindAddress(listen))?;
        }
        if let Some(http_listen) = self.http_listen {
            config.http_bind_addr = parse_optional_addr(&http_listen, 5380)
                .map_err(ConfigError::InvalidHttpBindAddress)?;
        }
        if let Some(zones) = self.zones {
            config.zones_url = zones;
        }
        if let Some(recurse) = self.recurse {
            config.upstream =
                parse_optional_addr(&recurse, 53).map_err(ConfigError::InvalidUpstreamServer)?;
        }
        if let Some(key) = self.key {
            config.api_key = (!key.is_empty()).then_some(key);
        }
        if let Some(snapshot) = self.snapshot {
            config.snapshot_path = (!snapshot.is_empty()
                && !snapshot.eq_ignore_ascii_case("disabled"))
            .then(|| PathBuf::from(snapshot));
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval = Duration::from_secs(secs);
        }
        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = DnsConfig::from_env()?;
    args.apply(&mut config)?;
    info!("Starting zoneagent with config: {:?}", config);

    let snapshot = match &config.snapshot_path {
        Some(path) => match SnapshotStore::open(path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Snapshot at {} unavailable, continuing without it: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let zone_store = Arc::new(ZoneStore::new());
    let refresher = Arc::new(ZoneRefresher::new(
        &config.zones_url,
        config.fetch_timeout,
        zone_store.clone(),
        snapshot,
    )?);

    if let Some(stats) = refresher.seed_from_snapshot().await {
        info!("Seeded zones from snapshot: {}", stats);
    }

    let (shutdown_tx, _) = broadcast::channel(1);

    let listeners = Listeners::bind(config.bind_addr).await?;
    let handler = Arc::new(DnsHandler::new(
        zone_store,
        Forwarder::new(config.upstream, config.upstream_timeout),
        config.alias_fallback,
        config.reject_edns,
    ));
    let query_semaphore = Arc::new(Semaphore::new(config.max_concurrent_queries));
    let deadlines = Deadlines::from(&config);

    let dns_shutdown = shutdown_tx.clone();
    let dns_task = tokio::spawn(async move {
        if let Err(e) =
            run_dns_server(listeners, handler, query_semaphore, deadlines, &dns_shutdown).await
        {
            error!("DNS server error: {}", e);
        }
    });

    let http_task = match config.http_bind_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            let server = HttpServer::new(refresher.clone(), config.api_key.clone());
            let shutdown_rx = shutdown_tx.subscribe();
            Some(tokio::spawn(async move {
                if let Err(e) = server.serve(listener, shutdown_rx).await {
                    error!("Control plane error: {}", e);
                }
            }))
        }
        None => {
            info!("Control plane disabled");
            None
        }
    };

    // Serving without ever having loaded the live document is not allowed
    match refresher.refresh().await {
        Ok(stats) => info!("Initial zone load complete: {}", stats),
        Err(e) => {
            error!("Initial zone load from {} failed: {}", config.zones_url, e);
            let _ = shutdown_tx.send(());
            return Err(e.into());
        }
    }

    let refresh_task = if config.refresh_interval.is_zero() {
        info!("Periodic zone refresh disabled");
        None
    } else {
        Some(tokio::spawn(
            refresher
                .clone()
                .run_periodic(config.refresh_interval, shutdown_tx.subscribe()),
        ))
    };

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping");
    let _ = shutdown_tx.send(());

    let _ = dns_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
    if let Some(task) = refresh_task {
        let _ = task.await;
    }

    info!("Shutdown complete");
    Ok(())
}
