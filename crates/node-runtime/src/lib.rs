//! # Node Runtime
//!
//! Wires the router's subsystems together and runs them until shutdown.
//! The binary in `main.rs` loads configuration, installs logging and hands
//! over to [`NodeRuntime`].
//!
//! ## Startup Sequence
//!
//! 1. Build components (object store, registry, router)
//! 2. Start the registry's block producer
//! 3. Start the router's resolver tasks
//! 4. Bind the OOB listener and accept clients
//!
//! ## Crate Structure
//!
//! - `container/` - `RouterConfig` and `RouterComponents`

pub mod container;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use bw_07_oob_adapter::OobServer;

pub use container::{ConfigError, RouterComponents, RouterConfig};

/// How long shutdown waits for each task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct NodeRuntime {
    components: RouterComponents,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeRuntime {
    pub fn new(config: RouterConfig) -> Result<Self> {
        info!("creating router runtime");
        let components = RouterComponents::new(config)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            components,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start background tasks and the listener. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        info!("===========================================");
        info!("  Bosswave Router v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let c = &self.components;
        let producer = c
            .registry
            .spawn_block_producer(c.config.block_interval(), self.shutdown_tx.subscribe());
        c.router.start();

        let server = OobServer::bind(c.config.oob_config(), Arc::clone(&c.router))
            .await
            .with_context(|| format!("binding OOB listener on {}", c.config.oob.listen))?;
        let addr = server.local_addr()?;
        let listener = tokio::spawn(server.serve(self.shutdown_tx.subscribe()));

        self.tasks.lock().extend([producer, listener]);
        info!(oob = %addr, "router running");
        Ok(addr)
    }

    /// Signal shutdown, then wait briefly for tasks to drain.
    pub async fn shutdown(&self) {
        info!("initiating graceful shutdown");
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("task did not stop in time");
            }
        }
        self.components.router.shutdown().await;
        info!("shutdown complete");
    }

    pub fn components(&self) -> &RouterComponents {
        &self.components
    }
}
