//! # Resolver Service
//!
//! Typed, cached access to the registry. One read-write lock guards every
//! cache; it is never held across a registry call.
//!
//! ## Background Tasks
//!
//! | Task | Wakes on | Does |
//! |------|----------|------|
//! | invalidation | new block | scans registry events since the last seen block and flushes affected entries |
//! | expiry | earliest cached expiry, interval, or notify | flushes expired entities and DOTs |

use crate::domain::alias::{long_alias_key, parse_short_alias};
use crate::domain::cache::{ChainCacheKey, DotLink, ResolutionCaches};
use crate::domain::events::RegistryEvent;
use crate::ports::outbound::RegistryProvider;
use bw_01_objects::{DChain, Dot, Entity, RoutingObject};
use parking_lot::{Mutex, RwLock};
use shared_crypto::{fmt_hash, fmt_key, unfmt_key};
use shared_types::{
    now_millis, BwError, BwResult, Hash32, StatusCode, ValidityState, Vk, EVERYBODY_VK,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Blocks after a new DOT on a namespace during which built chains for
    /// that namespace are not cached.
    pub holdoff_blocks: u64,
    /// Longest sleep of the expiry task between sweeps.
    pub expiry_check_interval: Duration,
    /// Cap on the computed wait until the earliest cached expiry.
    pub max_expiry_wait: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            holdoff_blocks: 6,
            expiry_check_interval: Duration::from_millis(5000),
            max_expiry_wait: Duration::from_secs(3600),
        }
    }
}

pub struct Resolver {
    registry: Arc<dyn RegistryProvider>,
    config: ResolverConfig,
    caches: RwLock<ResolutionCaches>,
    /// Last block whose events have been processed. Also serialises
    /// invalidation passes.
    last_block: Mutex<u64>,
    expiry_notify: Notify,
}

impl Resolver {
    pub fn new(registry: Arc<dyn RegistryProvider>, config: ResolverConfig) -> Self {
        let last_block = registry.current_block();
        Self {
            registry,
            config,
            caches: RwLock::new(ResolutionCaches::new()),
            last_block: Mutex::new(last_block),
            expiry_notify: Notify::new(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn RegistryProvider> {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    // =========================================================================
    // Entities and DOTs
    // =========================================================================

    /// Entity and its state. Errors only for registry failures, never for
    /// revocation or expiry.
    pub async fn resolve_entity(&self, vk: &Vk) -> BwResult<(Option<Arc<Entity>>, ValidityState)> {
        if let Some((entity, state)) = self.caches.read().entity(vk) {
            return Ok((Some(entity), state));
        }
        let (entity, mut state) = self.registry.resolve_entity(vk).await?;
        let Some(entity) = entity else {
            return Ok((None, ValidityState::Unknown));
        };
        if state == ValidityState::Valid && entity.is_expired(&now_millis()) {
            state = ValidityState::Expired;
        }
        if state != ValidityState::Unknown {
            self.caches.write().insert_entity(Arc::clone(&entity), state);
        }
        Ok((Some(entity), state))
    }

    /// DOT and its state, combined with the state of its giver and
    /// receiver.
    pub async fn resolve_dot(&self, hash: &Hash32) -> BwResult<(Option<Arc<Dot>>, ValidityState)> {
        if let Some((dot, state)) = self.caches.read().dot(hash) {
            return Ok((Some(dot), state));
        }
        let (dot, mut state) = self.registry.resolve_dot(hash).await?;
        let Some(dot) = dot else {
            return Ok((None, ValidityState::Unknown));
        };
        if state == ValidityState::Valid {
            let (_, giver) = self.resolve_entity(dot.giver()).await?;
            state = state.combine(giver);
            if dot.receiver() != &EVERYBODY_VK {
                let (_, receiver) = self.resolve_entity(dot.receiver()).await?;
                state = state.combine(receiver);
            }
            if state == ValidityState::Valid && dot.is_expired(&now_millis()) {
                state = ValidityState::Expired;
            }
        }
        if state != ValidityState::Unknown {
            self.caches.write().insert_dot(Arc::clone(&dot), state);
        }
        Ok((Some(dot), state))
    }

    /// Every DOT `vk` has granted, with current states.
    pub async fn resolve_granted_dots(&self, vk: &Vk) -> BwResult<Vec<DotLink>> {
        let cached = self.caches.read().granted_complete(vk);
        let hashes = match cached {
            Some(hashes) => hashes,
            None => {
                let hashes = self.registry.resolve_dots_from_vk(vk).await?;
                self.caches
                    .write()
                    .insert_granted_complete(*vk, hashes.clone());
                hashes
            }
        };
        let mut links = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            match self.resolve_dot(hash).await? {
                (Some(dot), state) => links.push(DotLink { dot, state }),
                (None, _) => warn!(dot = %fmt_hash(hash), "granted DOT vanished from registry"),
            }
        }
        Ok(links)
    }

    /// Registry access chain with DOTs attached where they resolve. The
    /// state is only `Valid` if every DOT is.
    pub async fn resolve_access_chain(
        &self,
        hash: &Hash32,
    ) -> BwResult<(Option<DChain>, ValidityState)> {
        let (chain, mut state) = self.registry.resolve_access_chain(hash).await?;
        let Some(mut chain) = chain else {
            return Ok((None, ValidityState::Unknown));
        };
        let hashes = chain.dot_hashes().to_vec();
        for (i, dot_hash) in hashes.iter().enumerate() {
            let (dot, dot_state) = self.resolve_dot(dot_hash).await?;
            if let Some(dot) = dot {
                chain.set_dot(i, dot)?;
            }
            state = state.combine(dot_state);
        }
        Ok((Some(chain), state))
    }

    // =========================================================================
    // Keys and routing objects by name
    // =========================================================================

    /// A base64 VK, `@hex` short alias, or long alias name.
    pub async fn resolve_key(&self, name: &str) -> BwResult<Vk> {
        if let Ok(vk) = unfmt_key(name) {
            return Ok(vk);
        }
        let value = if let Some(short) = name.strip_prefix('@') {
            self.registry
                .resolve_short_alias(parse_short_alias(short)?)
                .await?
        } else {
            let key = long_alias_key(name.as_bytes()).map_err(|_| {
                BwError::new(
                    StatusCode::UnresolvedAlias,
                    format!("{name:?} is neither a key nor an alias"),
                )
            })?;
            self.registry.resolve_alias(&key).await?
        };
        value.ok_or_else(|| {
            BwError::new(
                StatusCode::UnresolvedAlias,
                format!("alias {name:?} not found"),
            )
        })
    }

    /// Resolve `name` as a DOT hash, then an entity, then a chain hash.
    /// Non-`Valid` states are reported, not raised.
    pub async fn resolve_ro(&self, name: &str) -> BwResult<(RoutingObject, ValidityState)> {
        let key = self.resolve_key(name).await?;
        if let (Some(dot), state) = self.resolve_dot(&key).await? {
            return Ok((RoutingObject::Dot(dot), state));
        }
        if let (Some(entity), state) = self.resolve_entity(&key).await? {
            return Ok((RoutingObject::Entity(entity), state));
        }
        if let (Some(chain), state) = self.resolve_access_chain(&key).await? {
            return Ok((RoutingObject::Chain(chain), state));
        }
        Err(BwError::new(
            StatusCode::ResolutionFailed,
            format!("nothing in the registry under {name}"),
        ))
    }

    // =========================================================================
    // Built chains
    // =========================================================================

    /// Cache chains built for `key`, unless the namespace is held off.
    pub fn cache_built_chains(&self, key: ChainCacheKey, chains: Vec<DChain>) {
        let current = self.registry.current_block();
        let count = chains.len();
        if self.caches.write().cache_chains(key, chains, current) {
            debug!(chains = count, "cached built chains");
        }
    }

    /// Cached chains for `key` whose DOTs are all still valid, or `None`
    /// when nothing is cached.
    pub async fn resolve_built_chain(&self, key: &ChainCacheKey) -> BwResult<Option<Vec<DChain>>> {
        let Some(chains) = self.caches.read().chains(key) else {
            return Ok(None);
        };
        let mut valid = Vec::with_capacity(chains.len());
        'chains: for chain in chains {
            for hash in chain.dot_hashes() {
                let (_, state) = self.resolve_dot(hash).await?;
                if state != ValidityState::Valid {
                    debug!(chain = %fmt_hash(chain.chain_hash()), state = state.as_str(), "dropping stale cached chain");
                    continue 'chains;
                }
            }
            valid.push(chain);
        }
        Ok(Some(valid))
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    pub fn flush_entity(&self, vk: &Vk) {
        self.caches.write().flush_entity(vk);
    }

    pub fn flush_dot(&self, hash: &Hash32) {
        self.caches.write().flush_dot(hash);
    }

    pub fn flush_granted_from(&self, vk: &Vk) {
        self.caches.write().flush_granted_from(vk);
    }

    /// Drop cached chains on `nsvk` and hold off re-caching for the
    /// configured number of blocks.
    pub fn flush_chain_nsvk(&self, nsvk: &Vk) {
        let until = self.registry.current_block() + self.config.holdoff_blocks;
        self.caches.write().flush_chain_nsvk(nsvk, until);
        debug!(nsvk = %fmt_key(nsvk), until, "flushed chains, holdoff set");
    }

    /// Flush expired objects; returns the time until the next expiry.
    pub fn flush_expired(&self) -> Duration {
        self.caches
            .write()
            .flush_expired(&now_millis(), self.config.max_expiry_wait)
    }

    /// Wake the expiry task early.
    pub fn notify_expiry(&self) {
        self.expiry_notify.notify_one();
    }

    /// Process registry events between the last seen block and the
    /// current one.
    pub async fn check_chain_change(&self) -> BwResult<()> {
        let current = self.registry.current_block();
        let from = {
            let mut last = self.last_block.lock();
            if *last >= current {
                return Ok(());
            }
            std::mem::replace(&mut *last, current)
        };
        let events = match self.registry.events_between(from, current).await {
            Ok(events) => events,
            Err(e) => {
                // Retry the same range next block.
                *self.last_block.lock() = from;
                return Err(e);
            }
        };
        trace!(from, to = current, events = events.len(), "checking registry events");
        for ev in events {
            self.apply_event(&ev.event);
        }
        Ok(())
    }

    fn apply_event(&self, event: &RegistryEvent) {
        match event {
            RegistryEvent::NewDot {
                hash, giver, nsvk, ..
            } => {
                debug!(dot = %fmt_hash(hash), giver = %fmt_key(giver), "new DOT on registry");
                self.flush_granted_from(giver);
                if let Some(nsvk) = nsvk {
                    self.flush_chain_nsvk(nsvk);
                }
                self.flush_dot(hash);
            }
            RegistryEvent::NewDotRevocation { hash } => {
                debug!(dot = %fmt_hash(hash), "DOT revoked on registry");
                self.flush_dot(hash);
            }
            RegistryEvent::NewEntity { vk } | RegistryEvent::NewEntityRevocation { vk } => {
                debug!(entity = %fmt_key(vk), "entity changed on registry");
                self.flush_entity(vk);
            }
        }
    }

    /// Spawn the invalidation and expiry tasks. Both exit when `shutdown`
    /// turns true.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_invalidation(shutdown.clone()),
            self.spawn_expiry(shutdown),
        ]
    }

    fn spawn_invalidation(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        let mut blocks = self.registry.subscribe_blocks();
        tokio::spawn(async move {
            info!("resolver invalidation task started");
            loop {
                tokio::select! {
                    res = blocks.recv() => match res {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            if let Err(e) = resolver.check_chain_change().await {
                                warn!(error = %e, "registry event scan failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("resolver invalidation task stopped");
        })
    }

    fn spawn_expiry(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let mut next = resolver.config.expiry_check_interval;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(next) => {}
                    _ = resolver.expiry_notify.notified() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                let until_next = resolver.flush_expired();
                next = until_next.min(resolver.config.expiry_check_interval);
                trace!(next_ms = next.as_millis() as u64, "expiry sweep");
            }
            debug!("resolver expiry task stopped");
        })
    }

    pub fn cached_entity_count(&self) -> usize {
        self.caches.read().entity_count()
    }

    pub fn cached_dot_count(&self) -> usize {
        self.caches.read().dot_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRegistry;
    use crate::domain::events::TransactionParams;
    use bw_01_objects::{AccessGrant, DotBody, DotParams, Metadata, Revocation};
    use shared_types::AccessPermissions;

    struct Fixture {
        registry: Arc<InMemoryRegistry>,
        resolver: Arc<Resolver>,
        _stop: watch::Sender<bool>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(InMemoryRegistry::new(TransactionParams {
            confirmations: 1,
            timeout_blocks: 10,
        }));
        let (stop, rx) = watch::channel(false);
        registry.spawn_block_producer(Duration::from_millis(5), rx);
        let resolver = Arc::new(Resolver::new(
            registry.clone() as Arc<dyn RegistryProvider>,
            ResolverConfig::default(),
        ));
        Fixture {
            registry,
            resolver,
            _stop: stop,
        }
    }

    fn grant(giver: &Entity, receiver: &Vk, suffix: &str) -> Dot {
        Dot::sign(
            giver.sk().unwrap(),
            DotParams {
                receiver: *receiver,
                ttl: 3,
                meta: Metadata::default(),
                body: DotBody::Access(AccessGrant {
                    mvk: *giver.vk(),
                    suffix: suffix.into(),
                    permissions: AccessPermissions::parse("P").unwrap(),
                }),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_cached() {
        let f = fixture();
        let (e, state) = f.resolver.resolve_entity(&[1u8; 32]).await.unwrap();
        assert!(e.is_none());
        assert_eq!(state, ValidityState::Unknown);
        assert_eq!(f.resolver.cached_entity_count(), 0);
    }

    #[tokio::test]
    async fn test_dot_state_combines_entities() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        let user = Entity::create(Metadata::default()).unwrap();
        f.registry.publish_entity(&ns).await.unwrap();
        f.registry.publish_entity(&user).await.unwrap();
        let dot = grant(&ns, user.vk(), "a/*");
        f.registry.publish_dot(&dot).await.unwrap();

        let (got, state) = f.resolver.resolve_dot(dot.hash()).await.unwrap();
        assert_eq!(got.unwrap().hash(), dot.hash());
        assert_eq!(state, ValidityState::Valid);
        assert_eq!(f.resolver.cached_dot_count(), 1);
        assert_eq!(f.resolver.cached_entity_count(), 2);

        let links = f.resolver.resolve_granted_dots(ns.vk()).await.unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].state.is_valid());
    }

    #[tokio::test]
    async fn test_flush_entity_clears_dependents() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        let user = Entity::create(Metadata::default()).unwrap();
        f.registry.publish_entity(&ns).await.unwrap();
        f.registry.publish_entity(&user).await.unwrap();
        let dot = grant(&ns, user.vk(), "a/*");
        f.registry.publish_dot(&dot).await.unwrap();
        f.resolver.resolve_dot(dot.hash()).await.unwrap();

        f.resolver.flush_entity(user.vk());
        assert_eq!(f.resolver.cached_dot_count(), 0);
        assert_eq!(f.resolver.cached_entity_count(), 1);
    }

    #[tokio::test]
    async fn test_revocation_event_invalidates() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        let user = Entity::create(Metadata::default()).unwrap();
        f.registry.publish_entity(&ns).await.unwrap();
        f.registry.publish_entity(&user).await.unwrap();
        let dot = grant(&ns, user.vk(), "a/*");
        f.registry.publish_dot(&dot).await.unwrap();
        f.resolver.check_chain_change().await.unwrap();
        let (_, state) = f.resolver.resolve_dot(dot.hash()).await.unwrap();
        assert!(state.is_valid());

        let r = Revocation::sign(ns.sk().unwrap(), *dot.hash(), None, "").unwrap();
        f.registry.publish_revocation(&r).await.unwrap();
        // cached answer is stale until the events are processed
        let (_, state) = f.resolver.resolve_dot(dot.hash()).await.unwrap();
        assert!(state.is_valid());
        f.resolver.check_chain_change().await.unwrap();
        let (_, state) = f.resolver.resolve_dot(dot.hash()).await.unwrap();
        assert_eq!(state, ValidityState::Revoked);
    }

    #[tokio::test]
    async fn test_new_dot_sets_holdoff() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        let key = ChainCacheKey::new(
            *ns.vk(),
            "a/b",
            &AccessPermissions::parse("P").unwrap(),
            [2u8; 32],
        );
        f.resolver.cache_built_chains(key.clone(), vec![]);
        let cached = f.resolver.resolve_built_chain(&key).await.unwrap();
        assert!(cached.is_some_and(|c| c.is_empty()));

        f.resolver.flush_chain_nsvk(ns.vk());
        assert!(f.resolver.resolve_built_chain(&key).await.unwrap().is_none());
        f.resolver.cache_built_chains(key.clone(), vec![]);
        assert!(f.resolver.resolve_built_chain(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_cached_chain_is_skipped() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        let user = Entity::create(Metadata::default()).unwrap();
        f.registry.publish_entity(&ns).await.unwrap();
        f.registry.publish_entity(&user).await.unwrap();
        let dot = Arc::new(grant(&ns, user.vk(), "a/*"));
        f.registry.publish_dot(&dot).await.unwrap();
        let chain = DChain::from_dots(true, vec![dot.clone()]).unwrap();
        let key = ChainCacheKey::new(
            *ns.vk(),
            "a/b",
            &AccessPermissions::parse("P").unwrap(),
            *user.vk(),
        );
        f.resolver.cache_built_chains(key.clone(), vec![chain.clone()]);
        let cached = f.resolver.resolve_built_chain(&key).await.unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].chain_hash(), chain.chain_hash());

        let r = Revocation::sign(user.sk().unwrap(), *user.vk(), None, "").unwrap();
        f.registry.publish_revocation(&r).await.unwrap();
        f.resolver.flush_entity(user.vk());
        let cached = f.resolver.resolve_built_chain(&key).await.unwrap().unwrap();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_key_forms() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        assert_eq!(f.resolver.resolve_key(&fmt_key(ns.vk())).await.unwrap(), *ns.vk());

        f.registry
            .create_long_alias(long_alias_key(b"home").unwrap(), *ns.vk())
            .await
            .unwrap();
        assert_eq!(f.resolver.resolve_key("home").await.unwrap(), *ns.vk());

        let n = f.registry.create_short_alias(*ns.vk()).await.unwrap();
        let short = format!("@{n:x}");
        assert_eq!(f.resolver.resolve_key(&short).await.unwrap(), *ns.vk());

        let err = f.resolver.resolve_key("nope").await.unwrap_err();
        assert_eq!(err.code, StatusCode::UnresolvedAlias);
    }

    #[tokio::test]
    async fn test_resolve_ro_reports_state() {
        let f = fixture();
        let ns = Entity::create(Metadata::default()).unwrap();
        f.registry.publish_entity(&ns).await.unwrap();
        let (ro, state) = f.resolver.resolve_ro(&fmt_key(ns.vk())).await.unwrap();
        assert!(matches!(ro, RoutingObject::Entity(_)));
        assert!(state.is_valid());

        let missing = fmt_key(&[3u8; 32]);
        assert_eq!(
            f.resolver.resolve_ro(&missing).await.unwrap_err().code,
            StatusCode::ResolutionFailed
        );
    }
}
