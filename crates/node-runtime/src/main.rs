//! # Bosswave Router
//!
//! `node-runtime [config.toml]`
//!
//! Exits 0 after a clean Ctrl-C shutdown, 1 on a startup or config error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{NodeRuntime, RouterConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = RouterConfig::load(path.as_deref()).context("loading configuration")?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("bad log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = NodeRuntime::new(config)?;
    runtime.start().await?;

    info!("router is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
