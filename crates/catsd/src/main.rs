//! catsd — the CATS daemon.
//!
//! One binary, three roles:
//! - `standalone`: aggregator and selector sharing one snapshot store
//! - `aggregator`: polls sites and serves `/sync`
//! - `selector`: mirrors a remote `/sync` and serves `/select`
//!
//! # Usage
//!
//! ```text
//! catsd standalone --config cats.toml --port 8080
//! catsd aggregator --config cats.toml --port 8081
//! catsd selector --sync-url http://10.0.0.5:8081/sync --port 8080
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cats_aggregator::{MetricsAggregator, SnapshotMirror, StaticSiteRegistry};
use cats_core::CatsConfig;
use cats_selector::{NetSelector, StaticCatalog};
use cats_state::SnapshotStore;

const DEFAULT_LOG_FILTER: &str = "info,catsd=debug,cats=debug";

#[derive(Parser)]
#[command(name = "catsd", about = "CATS daemon: metrics aggregation and path selection")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Common {
    /// Path to cats.toml. Built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregator and selector in one process.
    Standalone {
        #[command(flatten)]
        common: Common,
    },
    /// Poll sites and serve the aggregated snapshot.
    Aggregator {
        #[command(flatten)]
        common: Common,
    },
    /// Mirror a remote aggregator and serve path selection.
    Selector {
        #[command(flatten)]
        common: Common,

        /// Remote aggregator sync endpoint, e.g. `http://host:8081/sync`.
        #[arg(long)]
        sync_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Standalone { common } => run_standalone(common).await,
        Command::Aggregator { common } => run_aggregator(common).await,
        Command::Selector { common, sync_url } => run_selector(common, sync_url).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CatsConfig> {
    match path {
        Some(path) => {
            let config = CatsConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            info!(path = %path.display(), sites = config.sites.len(), "config loaded");
            Ok(config)
        }
        None => {
            info!("no config file given, using defaults");
            Ok(CatsConfig::default())
        }
    }
}

fn net_selector(config: &CatsConfig, store: SnapshotStore) -> anyhow::Result<Arc<NetSelector>> {
    let settings = config.selector.resolve()?;
    let catalog = StaticCatalog::new(config.catalog.services.iter().cloned());
    info!(
        liveness_path = %settings.liveness_path,
        probe_count = settings.probe_count,
        deadline_ms = settings.request_deadline.as_millis() as u64,
        catalog = config.catalog.services.len(),
        "path selector initialized"
    );
    Ok(Arc::new(NetSelector::with_net_prober(store, catalog, settings)))
}

async fn run_standalone(common: Common) -> anyhow::Result<()> {
    info!("CATS daemon starting in standalone mode");
    let config = load_config(common.config.as_deref())?;

    let store = SnapshotStore::new();
    let aggregator = MetricsAggregator::new(
        StaticSiteRegistry::new(config.sites.clone()),
        store.clone(),
        config.aggregator.resolve()?,
    );
    let selector = net_selector(&config, store.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let aggregator_handle = tokio::spawn(async move {
        aggregator.run(shutdown_rx).await;
    });

    let router = cats_api::build_router(store, Some(selector));
    serve(router, common.port, shutdown_tx).await?;

    let _ = aggregator_handle.await;
    info!("CATS daemon stopped");
    Ok(())
}

async fn run_aggregator(common: Common) -> anyhow::Result<()> {
    info!("CATS daemon starting in aggregator mode");
    let config = load_config(common.config.as_deref())?;

    let store = SnapshotStore::new();
    let aggregator = MetricsAggregator::new(
        StaticSiteRegistry::new(config.sites.clone()),
        store.clone(),
        config.aggregator.resolve()?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let aggregator_handle = tokio::spawn(async move {
        aggregator.run(shutdown_rx).await;
    });

    let router = cats_api::build_router(store, None);
    serve(router, common.port, shutdown_tx).await?;

    let _ = aggregator_handle.await;
    info!("CATS daemon stopped");
    Ok(())
}

async fn run_selector(common: Common, sync_url: String) -> anyhow::Result<()> {
    info!(%sync_url, "CATS daemon starting in selector mode");
    let config = load_config(common.config.as_deref())?;
    let aggregator_settings = config.aggregator.resolve()?;

    let store = SnapshotStore::new();
    let mirror = SnapshotMirror::new(
        sync_url,
        store.clone(),
        aggregator_settings.interval,
        aggregator_settings.poll_timeout,
    );
    let selector = net_selector(&config, store.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mirror_handle = tokio::spawn(async move {
        mirror.run(shutdown_rx).await;
    });

    let router = cats_api::build_router(store, Some(selector));
    serve(router, common.port, shutdown_tx).await?;

    let _ = mirror_handle.await;
    info!("CATS daemon stopped");
    Ok(())
}

/// Serve `router` until Ctrl-C, then signal background loops to stop.
async fn serve(router: axum::Router, port: u16, shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;
    Ok(())
}
