//! # Test Fixtures
//!
//! A router over the in-memory registry and KV store, with a fast block
//! producer so registry writes confirm within a few milliseconds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bw_01_objects::{DChain, Dot, Entity, Metadata};
use bw_02_object_store::{InMemoryKVStore, KeyValueStore, ObjectStore};
use bw_03_resolver::{InMemoryRegistry, RegistryProvider, TransactionParams};
use bw_06_message_pipeline::{BosswaveClient, CreateDotParams, Router, RouterSettings};
use shared_types::Vk;
use tokio::sync::watch;

pub const BLOCK_INTERVAL: Duration = Duration::from_millis(5);

pub struct Network {
    pub router: Arc<Router>,
    pub registry: Arc<InMemoryRegistry>,
    _stop: watch::Sender<bool>,
}

impl Network {
    pub async fn new() -> Self {
        let registry = Arc::new(InMemoryRegistry::new(TransactionParams {
            confirmations: 1,
            timeout_blocks: 20,
        }));
        let (stop, rx) = watch::channel(false);
        registry.spawn_block_producer(BLOCK_INTERVAL, rx);
        let kv: Box<dyn KeyValueStore> = Box::new(InMemoryKVStore::new());
        let router = Arc::new(Router::new(
            RouterSettings::default(),
            Arc::new(ObjectStore::new(kv)),
            Arc::clone(&registry) as Arc<dyn RegistryProvider>,
        ));
        router.start();
        Self {
            router,
            registry,
            _stop: stop,
        }
    }

    /// A fresh entity, published to the registry.
    pub async fn entity(&self) -> Arc<Entity> {
        let e = Arc::new(Entity::create(Metadata::default()).expect("create entity"));
        self.registry
            .publish_entity(&e)
            .await
            .expect("publish entity");
        e
    }

    /// A client acting as `entity`.
    pub fn client_as(&self, entity: &Arc<Entity>) -> BosswaveClient {
        let c = self.router.create_client();
        c.set_entity_obj(Arc::clone(entity)).expect("set entity");
        c
    }

    /// `from` grants `to` access on `ns/suffix`; the DOT is published.
    pub async fn grant(
        &self,
        from: &Arc<Entity>,
        to: &Vk,
        ns: &Vk,
        suffix: &str,
        perms: &str,
        ttl: u8,
    ) -> Arc<Dot> {
        let c = self.client_as(from);
        let dot = c
            .create_dot(CreateDotParams {
                to: *to,
                ttl,
                mvk: *ns,
                suffix: suffix.to_string(),
                access_permissions: perms.to_string(),
                ..CreateDotParams::default()
            })
            .await
            .expect("create DOT");
        c.put_dot(&dot).await.expect("publish DOT");
        Arc::new(dot)
    }

    /// An elaborated chain over `dots`, published to the registry so a
    /// message carrying only its hash can be resolved.
    pub async fn chain(&self, dots: &[&Arc<Dot>]) -> DChain {
        let chain =
            DChain::from_dots(true, dots.iter().map(|d| Arc::clone(d)).collect()).expect("chain");
        self.router
            .create_client()
            .put_chain(&chain)
            .await
            .expect("publish chain");
        chain
    }
}

/// Poll `check` until it returns true or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(BLOCK_INTERVAL).await;
    }
}
