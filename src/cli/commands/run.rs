//! `shepherd run`: keep the fleet and its health loop alive until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::{init_logging, load_config, open_storage};
use crate::application::{OutputListener, Shepherd};
use crate::cli::output::sheep_table;

pub async fn execute(config_path: &Path, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = init_logging(&config)?;

    let (shepherd, notifications) =
        Shepherd::new(&config, open_storage(&config)).context("Invalid sheep configuration")?;
    let shepherd = Arc::new(shepherd);

    let (shutdown_tx, _) = broadcast::channel(1);
    let listener = OutputListener::new(shepherd.clone(), notifications, config.health.check_interval())
        .spawn(shutdown_tx.subscribe());

    let reports = shepherd.status_report().await;
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Shepherd running with {} sheep", reports.len());
        println!("{}", sheep_table(&reports));
    }

    wait_for_shutdown().await?;
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    listener.await.context("Output listener panicked")?;
    shepherd.kill_all().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")
}
