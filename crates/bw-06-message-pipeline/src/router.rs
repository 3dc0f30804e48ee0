//! # Router
//!
//! Owns every long-lived subsystem of one router process and hands out
//! per-connection clients. There is no process-global state: tests create
//! as many routers as they like.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: object store, registry provider (injected)
//! Level 1: resolver (registry)
//! Level 2: chain builder (resolver), terminus (store)
//! Level 3: verifier (resolver, store)
//! ```

use crate::client::BosswaveClient;
use crate::verify::MessageVerifier;
use bw_01_objects::Message;
use bw_02_object_store::DynObjectStore;
use bw_03_resolver::{RegistryProvider, Resolver, ResolverConfig};
use bw_04_chain_builder::{ChainBuilder, ChainBuilderConfig, GrantSource};
use bw_05_terminus::{Terminus, TerminusConfig};
use parking_lot::{Mutex, RwLock};
use shared_types::{BwError, BwResult, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// How long [`Router::shutdown`] waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Settings for every subsystem the router owns.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub resolver: ResolverConfig,
    pub terminus: TerminusConfig,
    pub chain_builder: ChainBuilderConfig,
    /// Registry head older than this refuses writes with `ChainStale`.
    pub max_chain_age: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            terminus: TerminusConfig::default(),
            chain_builder: ChainBuilderConfig::default(),
            max_chain_age: Duration::from_secs(300),
        }
    }
}

pub struct Router {
    // =========================================================================
    // LEVEL 0: injected backends
    // =========================================================================
    store: Arc<DynObjectStore>,
    registry: Arc<dyn RegistryProvider>,

    // =========================================================================
    // LEVEL 1-3: subsystems
    // =========================================================================
    resolver: Arc<Resolver>,
    builder: ChainBuilder,
    terminus: Arc<Terminus>,
    verifier: MessageVerifier,

    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    max_chain_age: RwLock<Duration>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    #[instrument(name = "router_init", skip_all)]
    pub fn new(
        settings: RouterSettings,
        store: Arc<DynObjectStore>,
        registry: Arc<dyn RegistryProvider>,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(registry.clone(), settings.resolver.clone()));
        info!(holdoff = settings.resolver.holdoff_blocks, "resolver initialized");

        let source: Arc<dyn GrantSource> = resolver.clone();
        let builder = ChainBuilder::new(source, settings.chain_builder.clone());
        let terminus = Arc::new(Terminus::new(store.clone(), settings.terminus.clone()));
        info!(
            workers = settings.chain_builder.workers,
            queue_depth = settings.terminus.queue_depth,
            "chain builder and terminus initialized"
        );

        let verifier = MessageVerifier::new(resolver.clone(), store.clone());
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            registry,
            resolver,
            builder,
            terminus,
            verifier,
            max_chain_age: RwLock::new(settings.max_chain_age),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the resolver's invalidation and expiry tasks.
    pub fn start(&self) {
        let handles = self.resolver.start(self.shutdown.subscribe());
        info!(tasks = handles.len(), "router background tasks started");
        self.tasks.lock().extend(handles);
    }

    /// Signal shutdown and wait for background tasks to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "background task panicked"),
                Err(_) => warn!("background task did not stop in time"),
            }
        }
        info!("router stopped");
    }

    /// Receiver that flips to `true` when the router shuts down.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn create_client(self: &Arc<Self>) -> BosswaveClient {
        BosswaveClient::new(self.clone(), self.terminus.new_client())
    }

    pub fn store(&self) -> &Arc<DynObjectStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn RegistryProvider> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn chain_builder(&self) -> &ChainBuilder {
        &self.builder
    }

    pub fn terminus(&self) -> &Arc<Terminus> {
        &self.terminus
    }

    pub(crate) fn verifier(&self) -> &MessageVerifier {
        &self.verifier
    }

    pub async fn verify(&self, m: &mut Message) -> BwResult<()> {
        self.verifier.verify(m).await
    }

    pub fn max_chain_age(&self) -> Duration {
        *self.max_chain_age.read()
    }

    pub fn set_max_chain_age(&self, age: Duration) {
        *self.max_chain_age.write() = age;
    }

    /// Refuse registry writes while the local view of the registry is stale.
    pub fn check_chain_age(&self) -> BwResult<()> {
        let age = self.registry.head_block_age();
        let max = self.max_chain_age();
        if age > max {
            return Err(BwError::new(
                StatusCode::ChainStale,
                format!("registry head is {}s old (limit {}s)", age.as_secs(), max.as_secs()),
            ));
        }
        Ok(())
    }
}
