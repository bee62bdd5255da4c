//! CoinJoin round coordinator.
//!
//! Runs a single pool from a TOML configuration file.

use anyhow::Context;
use clap::Parser;
use coinjoin_core::SystemClock;
use coinjoin_production::memory::{LogTransport, MemoryRoundStore, OfflineBlockchain};
use coinjoin_production::telemetry::init_tracing;
use coinjoin_production::{Coordinator, CoordinatorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "coinjoin-coordinator")]
#[command(about = "CoinJoin mix round coordinator")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "coordinator.toml")]
    config: PathBuf,

    /// Log filter, overrides the configured level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CoordinatorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.check {
        config
            .provenance_validator()
            .context("building fee validator")?;
        println!("{}: ok", cli.config.display());
        return Ok(());
    }

    let log_level = cli.log_level.as_deref().unwrap_or(&config.server.log_level);
    init_tracing(log_level).map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    warn!("No blockchain backend configured, inputs cannot be verified");
    let coordinator = Coordinator::new(
        &config,
        Arc::new(OfflineBlockchain),
        Arc::new(MemoryRoundStore::new()),
        Arc::new(LogTransport),
        Arc::new(SystemClock),
    )
    .context("starting coordinator")?;

    let notification = coordinator.current_round_status_notification()?;
    info!(round_id = %notification.round_id(), status = %notification.status(), "Round open");

    let ticker = coordinator.spawn_ticker(config.tick_interval());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");
    ticker.abort();
    Ok(())
}
