//! Shakestream binary.
//!
//! Loads configuration, opens the store, starts the retention sweeper and
//! serves the HTTP API until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use shakestream_core::{
    config::{Args, ServiceConfig},
    server::{self, state::AppState},
    storage::{SensorStore, StorageBackendType},
    sweeper::RetentionSweeper,
    telemetry,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(&args).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    // Dropping the guard stops the background log writer
    let _log_guard = telemetry::init(&config.logging).context("Failed to initialize logging")?;

    info!("Shakestream starting up");

    let backend = StorageBackendType::open(&config.storage)
        .with_context(|| format!("Failed to open {} storage", config.storage.engine))?;
    backend
        .sensor_store()
        .init(&config.sensors.supported)
        .await
        .context("Failed to create sensor tables")?;
    info!(
        "Storage ready ({} at {})",
        config.storage.engine, config.storage.connection
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = RetentionSweeper::new(
        backend.sensor_store(),
        config.sensors.supported.clone(),
        config.retention.horizon(),
        config.retention.sweep_interval(),
    )
    .with_initial_delay(config.retention.initial_delay())
    .start(shutdown_rx);

    let state = AppState::new(config, &backend).context("Failed to build server state")?;

    let result = server::start_server(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    })
    .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        error!("Retention sweeper task failed: {}", e);
    }
    info!("Shakestream stopped");
    result
}
