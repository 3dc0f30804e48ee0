//! # Router Components
//!
//! Holds the object store, registry and router with shared ownership.
//! Nothing here is started; `NodeRuntime` owns the lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use bw_02_object_store::{FileBackedKVStore, InMemoryKVStore, KeyValueStore, ObjectStore};
use bw_03_resolver::{InMemoryRegistry, RegistryProvider};
use bw_06_message_pipeline::Router;

use crate::container::config::RouterConfig;

pub struct RouterComponents {
    /// Concrete registry handle, kept for block production.
    pub registry: Arc<InMemoryRegistry>,
    pub router: Arc<Router>,
    /// Configuration (immutable after initialization).
    pub config: RouterConfig,
}

impl RouterComponents {
    #[instrument(name = "router_components", skip(config))]
    pub fn new(config: RouterConfig) -> Result<Self> {
        // =====================================================================
        // PHASE 1: Object store
        // =====================================================================
        let kv: Box<dyn KeyValueStore> = match &config.store.path {
            Some(path) => {
                let kv = FileBackedKVStore::open(path)
                    .with_context(|| format!("opening object store {}", path.display()))?;
                info!(path = %path.display(), "file-backed object store opened");
                Box::new(kv)
            }
            None => {
                info!("in-memory object store");
                Box::new(InMemoryKVStore::new())
            }
        };
        let store = Arc::new(ObjectStore::new(kv));

        // =====================================================================
        // PHASE 2: Registry
        // =====================================================================
        let registry = Arc::new(InMemoryRegistry::new(config.transaction_params()));
        info!(
            confirmations = config.registry.confirmations,
            timeout_blocks = config.registry.timeout_blocks,
            "in-memory registry created"
        );

        // =====================================================================
        // PHASE 3: Router
        // =====================================================================
        let router = Arc::new(Router::new(
            config.router_settings(),
            store,
            Arc::clone(&registry) as Arc<dyn RegistryProvider>,
        ));

        Ok(Self {
            registry,
            router,
            config,
        })
    }
}
