//! # Client
//!
//! One [`BosswaveClient`] per connection. It holds the active signing entity
//! and the subscription handles the connection owns; [`BosswaveClient::destroy`]
//! tears both down.

use crate::domain::params::{
    BcInteractionParams, BcipUpdate, BuildChainParams, CreateDotParams, CreateEntityParams,
    ElaboratePac, MessageRequest,
};
use crate::router::Router;
use bw_01_objects::{
    AccessGrant, DChain, Dot, DotBody, DotParams, Entity, Message, MessageParams, MessageType,
    Metadata, Revocation, RoutingObject, UniqueMessageId,
};
use bw_03_resolver::{long_alias_key, RouterOffer, TransactionParams};
use bw_04_chain_builder::BuildRequest;
use bw_05_terminus::{ClientId, SubscribeOutcome};
use parking_lot::{Mutex, RwLock};
use shared_crypto::{fmt_hash, fmt_key};
use shared_types::{
    analyze_suffix, now_millis, AccessPermissions, BwError, BwResult, StatusCode, Timestamp,
    ValidityState, Vk, EVERYBODY_VK,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Absolute expiry from either form a command may carry.
fn expiry_from(expiry: Option<Timestamp>, delta: Option<Duration>) -> BwResult<Option<Timestamp>> {
    if let Some(at) = expiry {
        return Ok(Some(at));
    }
    delta
        .map(|d| {
            chrono::Duration::from_std(d)
                .map(|d| now_millis() + d)
                .map_err(|_| BwError::new(StatusCode::BadOperation, "expiry delta out of range"))
        })
        .transpose()
}

pub struct BosswaveClient {
    router: Arc<Router>,
    id: ClientId,
    entity: RwLock<Option<Arc<Entity>>>,
    msgid: AtomicU16,
    subs: Mutex<HashSet<UniqueMessageId>>,
}

impl BosswaveClient {
    pub(crate) fn new(router: Arc<Router>, id: ClientId) -> Self {
        debug!(client = %id, "client created");
        Self {
            router,
            id,
            entity: RwLock::new(None),
            msgid: AtomicU16::new(rand_msgid_start()),
            subs: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    // =========================================================================
    // ACTIVE ENTITY
    // =========================================================================

    /// Make the keyed entity blob (`sk ++ entity`) the signing identity.
    pub fn set_entity(&self, blob: &[u8]) -> BwResult<Vk> {
        let entity = Entity::decode_with_key(blob)?;
        self.set_entity_obj(Arc::new(entity))
    }

    pub fn set_entity_obj(&self, entity: Arc<Entity>) -> BwResult<Vk> {
        if entity.sk().is_none() {
            return Err(BwError::new(StatusCode::NoEntity, "entity has no signing key"));
        }
        if !entity.sig_valid() {
            return Err(BwError::new(StatusCode::InvalidEntity, "entity signature invalid"));
        }
        let vk = *entity.vk();
        info!(client = %self.id, vk = %fmt_key(&vk), "active entity set");
        *self.entity.write() = Some(entity);
        Ok(vk)
    }

    pub fn entity(&self) -> BwResult<Arc<Entity>> {
        self.entity
            .read()
            .clone()
            .ok_or_else(|| BwError::new(StatusCode::NoEntity, "no entity set"))
    }

    // =========================================================================
    // OBJECT CREATION
    // =========================================================================

    pub fn create_entity(&self, p: CreateEntityParams) -> BwResult<Entity> {
        let meta = Metadata {
            created: (!p.omit_creation_date).then(now_millis),
            expiry: expiry_from(p.expiry, p.expiry_delta)?,
            revokers: p.revokers,
            contact: p.contact,
            comment: p.comment,
        };
        Entity::create(meta)
    }

    /// Sign a DOT from the active entity. Both ends must be valid in the
    /// registry unless the receiver is everybody.
    pub async fn create_dot(&self, p: CreateDotParams) -> BwResult<Dot> {
        let giver = self.entity()?;
        if p.is_permission {
            return Err(BwError::new(
                StatusCode::BadOperation,
                "permission DOTs cannot be created here",
            ));
        }
        self.router.check_chain_age()?;
        self.require_valid_entity(giver.vk(), "granting").await?;
        if p.to != EVERYBODY_VK {
            self.require_valid_entity(&p.to, "receiving").await?;
        }
        analyze_suffix(&p.suffix).ok_or_else(|| {
            BwError::new(StatusCode::BadURI, format!("bad URI suffix {:?}", p.suffix))
        })?;
        let permissions = AccessPermissions::parse(&p.access_permissions)
            .map_err(|e| BwError::new(StatusCode::BadPermissions, e.message))?;

        let meta = Metadata {
            created: (!p.omit_creation_date).then(now_millis),
            expiry: expiry_from(p.expiry, p.expiry_delta)?,
            revokers: p.revokers,
            contact: p.contact,
            comment: p.comment,
        };
        let sk = giver
            .sk()
            .ok_or_else(|| BwError::new(StatusCode::NoEntity, "entity has no signing key"))?;
        let dot = Dot::sign(
            sk,
            DotParams {
                receiver: p.to,
                ttl: p.ttl,
                meta,
                body: DotBody::Access(AccessGrant {
                    mvk: p.mvk,
                    suffix: p.suffix,
                    permissions,
                }),
            },
        )?;
        debug!(hash = %fmt_hash(dot.hash()), "DOT created");
        Ok(dot)
    }

    async fn require_valid_entity(&self, vk: &Vk, role: &str) -> BwResult<()> {
        let (_, state) = self.router.resolver().resolve_entity(vk).await?;
        if state != ValidityState::Valid {
            return Err(BwError::new(
                StatusCode::InvalidEntity,
                format!("{role} entity {} is {}", fmt_key(vk), state.as_str()),
            ));
        }
        Ok(())
    }

    /// Chain `dots` together and keep them in the local store so that a
    /// hash-only reference can be elaborated later.
    pub fn create_dot_chain(&self, dots: Vec<Arc<Dot>>, unelaborate: bool) -> BwResult<DChain> {
        let chain = DChain::from_dots(true, dots)?;
        self.remember_chain(&chain)?;
        debug!(hash = %fmt_hash(chain.chain_hash()), "chain created");
        Ok(if unelaborate { chain.unelaborated() } else { chain })
    }

    fn remember_chain(&self, chain: &DChain) -> BwResult<()> {
        self.router.store().put_chain(chain)
    }

    /// Revoke the DOT or entity identified by `target` as the active entity.
    pub fn create_revocation(&self, target: [u8; 32], comment: &str) -> BwResult<Revocation> {
        let entity = self.entity()?;
        let sk = entity
            .sk()
            .ok_or_else(|| BwError::new(StatusCode::NoEntity, "entity has no signing key"))?;
        Revocation::sign(sk, target, Some(now_millis()), comment)
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Publish (or persist) and return how many subscribers got the message.
    pub async fn publish(&self, req: MessageRequest, persist: bool) -> BwResult<usize> {
        let mtype = if persist {
            MessageType::Persist
        } else {
            MessageType::Publish
        };
        let mut m = self.compose(mtype, req).await?;
        self.router.verify(&mut m).await?;
        let terminus = self.router.terminus();
        if persist {
            terminus.persist(&m)
        } else {
            Ok(terminus.publish(&m))
        }
    }

    pub async fn subscribe(&self, req: MessageRequest, tap: bool) -> BwResult<SubscribeOutcome> {
        let mtype = if tap {
            MessageType::Tap
        } else {
            MessageType::Subscribe
        };
        let mut m = self.compose(mtype, req).await?;
        self.router.verify(&mut m).await?;
        let outcome = self.router.terminus().subscribe(self.id, &m)?;
        self.subs.lock().insert(outcome.umid);
        Ok(outcome)
    }

    pub fn unsubscribe(&self, umid: &UniqueMessageId) -> BwResult<()> {
        if !self.subs.lock().remove(umid) {
            return Err(BwError::new(
                StatusCode::UnsubscribeError,
                format!("no subscription {umid}"),
            ));
        }
        self.router.terminus().unsubscribe(self.id, umid)
    }

    /// Persisted messages matching the request. Each result is verified
    /// again; ones that no longer pass are left out.
    pub async fn query(&self, req: MessageRequest, tap: bool) -> BwResult<Vec<Message>> {
        let mtype = if tap {
            MessageType::TapQuery
        } else {
            MessageType::Query
        };
        let mut m = self.compose(mtype, req).await?;
        self.router.verify(&mut m).await?;
        let mut results = Vec::new();
        for mut found in self.router.terminus().query(&m)? {
            match self.router.verify(&mut found).await {
                Ok(()) => results.push(found),
                Err(e) => warn!(topic = %found.topic(), error = %e, "dropping stale persisted message"),
            }
        }
        Ok(results)
    }

    pub async fn list(&self, req: MessageRequest) -> BwResult<Vec<String>> {
        let mut m = self.compose(MessageType::List, req).await?;
        self.router.verify(&mut m).await?;
        self.router.terminus().list(&m)
    }

    /// Sign a message of type `mtype` from the active entity, attaching the
    /// routing objects the request asks for.
    async fn compose(&self, mtype: MessageType, req: MessageRequest) -> BwResult<Message> {
        let entity = self.entity()?;
        let info = analyze_suffix(&req.suffix).ok_or_else(|| {
            BwError::new(StatusCode::BadURI, format!("bad URI suffix {:?}", req.suffix))
        })?;

        let pac = if req.autochain && entity.vk() != &req.mvk {
            let required = mtype.required_permissions(&info);
            Some(
                self.build_any_chain(req.mvk, &req.suffix, required, *entity.vk())
                    .await?,
            )
        } else {
            req.primary_access_chain
        };

        let mut ros = Vec::new();
        let mut origin_known = false;
        if let Some(pac) = pac {
            let sent = match req.elaborate_pac {
                ElaboratePac::None => pac.unelaborated(),
                ElaboratePac::Partial | ElaboratePac::Full => {
                    let mut chain = pac;
                    self.router.verifier().elaborate(&mut chain, &[]).await?;
                    if req.elaborate_pac == ElaboratePac::Full {
                        for dot in chain.dots().unwrap_or_default() {
                            ros.push(RoutingObject::Dot(dot));
                        }
                    }
                    chain
                }
            };
            origin_known = sent.is_elaborated()
                && matches!(sent.receiver(), Some(r) if r != &EVERYBODY_VK && r == entity.vk());
            ros.insert(0, RoutingObject::Chain(sent));
        }
        if !origin_known {
            ros.push(RoutingObject::OriginVk(*entity.vk()));
        }
        if let Some(at) = expiry_from(req.expiry, req.expiry_delta)? {
            ros.push(RoutingObject::Expiry(at));
        }
        ros.extend(req.routing_objects);

        let params = MessageParams {
            mtype,
            msgid: self.msgid.fetch_add(1, Ordering::Relaxed),
            mvk: req.mvk,
            suffix: req.suffix,
            consumers: if mtype.carries_consumers() {
                req.consumers
            } else {
                0
            },
            routing_objects: ros,
            payload_objects: req.payload_objects,
        };
        Message::sign(params, &entity)
    }

    // =========================================================================
    // CHAIN BUILDING
    // =========================================================================

    /// Every chain granting `permissions` on `uri` to `to`, shortest first.
    pub async fn build_chain(&self, p: BuildChainParams) -> BwResult<Vec<DChain>> {
        let (ns, suffix) = p.uri.split_once('/').ok_or_else(|| {
            BwError::new(StatusCode::BadURI, format!("URI {:?} has no suffix", p.uri))
        })?;
        let nsvk = self.router.resolver().resolve_key(ns).await?;
        let permissions = AccessPermissions::parse(&p.permissions)
            .map_err(|e| BwError::new(StatusCode::BadPermissions, e.message))?;
        self.router.check_chain_age()?;
        let chains = self
            .router
            .chain_builder()
            .build(&BuildRequest::new(nsvk, suffix, permissions, p.to))
            .await?;
        for chain in &chains {
            self.remember_chain(chain)?;
        }
        info!(uri = %p.uri, found = chains.len(), "chain build finished");
        Ok(chains)
    }

    /// First chain found for the given grant, for autochain.
    pub async fn build_any_chain(
        &self,
        nsvk: Vk,
        suffix: &str,
        permissions: AccessPermissions,
        to: Vk,
    ) -> BwResult<DChain> {
        self.router.check_chain_age()?;
        let chains = self
            .router
            .chain_builder()
            .build(&BuildRequest::new(nsvk, suffix, permissions, to))
            .await?;
        let first = chains.into_iter().next().ok_or_else(|| {
            BwError::new(
                StatusCode::ChainBuildFailed,
                format!(
                    "no chain grants {} on {}/{suffix}",
                    permissions.to_perm_string(),
                    fmt_key(&nsvk)
                ),
            )
        })?;
        self.remember_chain(&first)?;
        Ok(first)
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    pub async fn put_entity(&self, entity: &Entity) -> BwResult<Vk> {
        self.router.check_chain_age()?;
        self.router.registry().publish_entity(entity).await?;
        self.router.store().put_entity(entity)?;
        info!(vk = %fmt_key(entity.vk()), "entity published");
        Ok(*entity.vk())
    }

    pub async fn put_dot(&self, dot: &Dot) -> BwResult<[u8; 32]> {
        self.router.check_chain_age()?;
        self.router.registry().publish_dot(dot).await?;
        self.router.store().put_dot(dot)?;
        info!(hash = %fmt_hash(dot.hash()), "DOT published");
        Ok(*dot.hash())
    }

    pub async fn put_chain(&self, chain: &DChain) -> BwResult<[u8; 32]> {
        self.router.check_chain_age()?;
        self.router.registry().publish_chain(chain).await?;
        self.router.store().put_chain(chain)?;
        info!(hash = %fmt_hash(chain.chain_hash()), "chain published");
        Ok(*chain.chain_hash())
    }

    pub async fn put_revocation(&self, revocation: &Revocation) -> BwResult<[u8; 32]> {
        self.router.check_chain_age()?;
        self.router.registry().publish_revocation(revocation).await?;
        info!(target = %fmt_hash(revocation.target()), "revocation published");
        Ok(*revocation.hash())
    }

    pub async fn resolve_ro(&self, name: &str) -> BwResult<(RoutingObject, ValidityState)> {
        self.router.check_chain_age()?;
        self.router.resolver().resolve_ro(name).await
    }

    /// Apply `update` and report the settings now in force.
    pub fn bc_interaction_params(&self, update: BcipUpdate) -> BwResult<BcInteractionParams> {
        let registry = self.router.registry();
        if update.confirmations.is_some() || update.timeout_blocks.is_some() {
            let current = registry.transaction_params();
            registry.set_transaction_params(TransactionParams {
                confirmations: update.confirmations.unwrap_or(current.confirmations),
                timeout_blocks: update.timeout_blocks.unwrap_or(current.timeout_blocks),
            })?;
        }
        if let Some(age) = update.max_chain_age {
            self.router.set_max_chain_age(age);
        }
        let current = registry.transaction_params();
        Ok(BcInteractionParams {
            confirmations: current.confirmations,
            timeout_blocks: current.timeout_blocks,
            max_chain_age: self.router.max_chain_age(),
            current_block: registry.current_block(),
            head_block_age: registry.head_block_age(),
        })
    }

    pub async fn make_short_alias(&self, value: [u8; 32]) -> BwResult<u64> {
        self.router.check_chain_age()?;
        self.router.registry().create_short_alias(value).await
    }

    pub async fn make_long_alias(&self, name: &[u8], value: [u8; 32]) -> BwResult<()> {
        self.router.check_chain_age()?;
        let key = long_alias_key(name)?;
        self.router.registry().create_long_alias(key, value).await
    }

    pub async fn resolve_long_alias(&self, name: &[u8]) -> BwResult<Option<[u8; 32]>> {
        let key = long_alias_key(name)?;
        self.resolve_alias(&key).await
    }

    pub async fn resolve_short_alias(&self, alias: u64) -> BwResult<Option<[u8; 32]>> {
        self.router.check_chain_age()?;
        self.router.registry().resolve_short_alias(alias).await
    }

    pub async fn resolve_alias(&self, key: &[u8; 32]) -> BwResult<Option<[u8; 32]>> {
        self.router.check_chain_age()?;
        self.router.registry().resolve_alias(key).await
    }

    pub async fn transfer(&self, to: &Vk, amount: u128) -> BwResult<()> {
        let from = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().transfer(from.vk(), to, amount).await
    }

    pub async fn balance(&self, account: &Vk) -> BwResult<u128> {
        self.router.check_chain_age()?;
        self.router.registry().balance(account).await
    }

    // =========================================================================
    // DESIGNATED ROUTERS
    // =========================================================================

    /// Offer to route `nsvk`, with the active entity as the router.
    pub async fn new_router_offer(&self, nsvk: &Vk) -> BwResult<()> {
        let dr = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().new_router_offer(&dr, nsvk).await
    }

    /// Accept `drvk` as router for the active entity's namespace.
    pub async fn accept_router_offer(&self, drvk: &Vk) -> BwResult<()> {
        let ns = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().accept_router_offer(&ns, drvk).await
    }

    pub async fn retract_router_offer(&self, nsvk: &Vk) -> BwResult<()> {
        let dr = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().retract_router_offer(&dr, nsvk).await
    }

    pub async fn retract_router_acceptance(&self, drvk: &Vk) -> BwResult<()> {
        let ns = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().retract_router_acceptance(&ns, drvk).await
    }

    pub async fn list_router_offers(&self, nsvk: &Vk) -> BwResult<Vec<RouterOffer>> {
        self.router.check_chain_age()?;
        self.router.registry().list_router_offers(nsvk).await
    }

    pub async fn update_srv_record(&self, record: &str) -> BwResult<()> {
        let dr = self.entity()?;
        self.router.check_chain_age()?;
        self.router.registry().update_srv_record(&dr, record).await
    }

    pub async fn srv_record(&self, drvk: &Vk) -> BwResult<Option<String>> {
        self.router.check_chain_age()?;
        self.router.registry().srv_record(drvk).await
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Cancel every subscription this client holds.
    pub fn destroy(&self) {
        let subs: Vec<_> = self.subs.lock().drain().collect();
        for umid in &subs {
            if let Err(e) = self.router.terminus().unsubscribe(self.id, umid) {
                debug!(client = %self.id, error = %e, "subscription already gone");
            }
        }
        self.router.terminus().destroy_client(self.id);
        debug!(client = %self.id, cancelled = subs.len(), "client destroyed");
    }
}

fn rand_msgid_start() -> u16 {
    rand::random()
}
