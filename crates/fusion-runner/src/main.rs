//! Detection fusion runner
//!
//! Usage: `fusion-runner [config.toml]`. Settings can also be given as
//! `FUSION__`-prefixed environment variables.

mod pipeline;
mod settings;
mod source;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::settings::RunnerConfig;

fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    info!("=== Detection Fusion Runner v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RunnerConfig::load(config_path.as_deref())?;

    tokio::select! {
        stats = pipeline::run(config) => {
            let stats = stats?;
            info!("Done after {} frames", stats.frames);
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            warn!("Interrupted, shutting down");
        }
    }

    Ok(())
}
