//! Fissure checker binary.
//!
//! Wires the upstream fetcher, the fissure service and the long-poll
//! gateway together and runs them until Ctrl-C.
//!
//! # Modes
//!
//! - `fissure-checker` or `fissure-checker serve`: run the service.
//! - `fissure-checker fetch-once`: fetch the upstream list once, print it
//!   as JSON to stdout and exit.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load configuration (`--config`, `FISSURE_CONFIG` or `fissure-config.yaml`)
//! 3. Initialize structured logging (tracing)
//! 4. Create the fissure service
//! 5. Spawn the snapshot updater (first fetch runs immediately)
//! 6. Spawn cache housekeeping
//! 7. Bind and spawn the HTTP gateway
//! 8. Wait for Ctrl-C, then stop every task

mod error;
mod housekeeping;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fissure_api::{AppState, spawn_gateway};
use fissure_core::{FissureConfig, FissureService};
use fissure_fetcher::{SnapshotUpdater, WarframeStatClient, wait_for_shutdown};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::CheckerError;

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "fissure-checker", version, about = "Warframe fissure long-poll service")]
struct Cli {
    /// Path to the YAML configuration file. A missing file means defaults.
    #[arg(
        long,
        short,
        global = true,
        env = "FISSURE_CONFIG",
        default_value = "fissure-config.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Mode {
    /// Run the long-poll service until Ctrl-C (default)
    Serve,
    /// Fetch the upstream fissure list once and print it as JSON
    FetchOnce,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the upstream client, or the
/// gateway bind fails.
#[tokio::main]
async fn main() -> Result<(), CheckerError> {
    let cli = Cli::parse();
    let config = FissureConfig::load_or_default(&cli.config)?;
    logging::init(&config.logging);

    match cli.mode.unwrap_or(Mode::Serve) {
        Mode::Serve => serve(config).await,
        Mode::FetchOnce => fetch_once(&config).await,
    }
}

/// Fetch the upstream list once and print it.
async fn fetch_once(config: &FissureConfig) -> Result<(), CheckerError> {
    let client = WarframeStatClient::new(&config.upstream)?;
    info!(url = client.url(), "fetching fissures once");

    let fissures = client.fetch_fissures().await?;
    info!(count = fissures.len(), "fetch complete");

    println!("{}", serde_json::to_string_pretty(&fissures)?);
    Ok(())
}

/// Run the long-poll service until Ctrl-C.
async fn serve(config: FissureConfig) -> Result<(), CheckerError> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        upstream = %config.upstream.base_url,
        refresh_interval_secs = config.upstream.refresh_interval_secs,
        default_timeout_secs = config.long_poll.default_timeout_secs,
        "fissure-checker starting"
    );

    let service = Arc::new(FissureService::new(config.cache.freshness()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = WarframeStatClient::new(&config.upstream)?;
    let updater = SnapshotUpdater::new(client, Arc::clone(&service), &config.upstream)
        .spawn(shutdown_rx.clone());

    let housekeeping = tokio::spawn(housekeeping::run(
        Arc::clone(&service),
        config.cache.eviction_interval(),
        shutdown_rx.clone(),
    ));

    let state = Arc::new(AppState::new(
        Arc::clone(&service),
        config.long_poll.clone(),
    ));
    let mut gateway_shutdown = shutdown_rx;
    let gateway = spawn_gateway(&config.server, state, async move {
        wait_for_shutdown(&mut gateway_shutdown).await;
    })
    .await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CheckerError::Signal {
            message: e.to_string(),
        })?;
    info!(
        active_waiters = service.active_waiter_count(),
        "shutdown requested"
    );

    if shutdown_tx.send(true).is_err() {
        debug!("all background tasks already stopped");
    }
    join_all([updater, housekeeping, gateway]).await?;

    info!("fissure-checker stopped");
    Ok(())
}

async fn join_all<const N: usize>(handles: [JoinHandle<()>; N]) -> Result<(), CheckerError> {
    for handle in handles {
        handle.await.map_err(|e| CheckerError::Task {
            message: e.to_string(),
        })?;
    }
    Ok(())
}
