//! In-memory registry.
//!
//! Transactions are queued on submit and applied when the next block is
//! mined. Blocks are produced by [`InMemoryRegistry::mine_block`] (tests)
//! or by the background producer the binary starts.

use crate::domain::alias::short_alias_key;
use crate::domain::events::{BlockEvent, RegistryEvent, RouterOffer, TransactionParams};
use crate::ports::outbound::RegistryProvider;
use async_trait::async_trait;
use bw_01_objects::{chain_hash_of, DChain, Dot, Entity, Revocation};
use parking_lot::Mutex;
use shared_crypto::{fmt_hash, fmt_key};
use shared_types::{
    now_millis, BwError, BwResult, Hash32, StatusCode, ValidityState, Vk, EVERYBODY_VK,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
enum Transaction {
    Entity(Arc<Entity>),
    Dot(Arc<Dot>),
    Chain(Vec<Hash32>),
    Revocation(Arc<Revocation>),
    Alias { key: [u8; 32], value: [u8; 32] },
    Transfer { from: Vk, to: Vk, amount: u128 },
    Offer { drvk: Vk, nsvk: Vk },
    Accept { drvk: Vk, nsvk: Vk },
    RetractOffer { drvk: Vk, nsvk: Vk },
    RetractAcceptance { drvk: Vk, nsvk: Vk },
    Srv { drvk: Vk, record: String },
}

struct Ledger {
    height: u64,
    last_block_at: Instant,
    params: TransactionParams,
    entities: HashMap<Vk, Arc<Entity>>,
    dots: HashMap<Hash32, Arc<Dot>>,
    granted: HashMap<Vk, Vec<Hash32>>,
    chains: HashMap<Hash32, Vec<Hash32>>,
    /// Revoked DOT hashes and entity VKs.
    revoked: HashSet<[u8; 32]>,
    aliases: HashMap<[u8; 32], [u8; 32]>,
    next_short_alias: u64,
    balances: HashMap<Vk, u128>,
    /// (drvk, nsvk) -> accepted
    offers: BTreeMap<(Vk, Vk), bool>,
    srv: HashMap<Vk, String>,
    events: BTreeMap<u64, Vec<RegistryEvent>>,
    pending: Vec<Transaction>,
}

impl Ledger {
    fn entity_state(&self, vk: &Vk) -> ValidityState {
        let Some(e) = self.entities.get(vk) else {
            return ValidityState::Unknown;
        };
        if self.revoked.contains(vk) {
            ValidityState::Revoked
        } else if e.is_expired(&now_millis()) {
            ValidityState::Expired
        } else {
            ValidityState::Valid
        }
    }

    fn dot_state(&self, hash: &Hash32) -> ValidityState {
        let Some(d) = self.dots.get(hash) else {
            return ValidityState::Unknown;
        };
        let own = if self.revoked.contains(hash) {
            ValidityState::Revoked
        } else if d.is_expired(&now_millis()) {
            ValidityState::Expired
        } else {
            ValidityState::Valid
        };
        let mut state = own.combine(self.entity_state(d.giver()));
        if d.receiver() != &EVERYBODY_VK {
            state = state.combine(self.entity_state(d.receiver()));
        }
        state
    }

    fn apply(&mut self, tx: Transaction) -> Option<RegistryEvent> {
        match tx {
            Transaction::Entity(e) => {
                let vk = *e.vk();
                self.entities.entry(vk).or_insert(e);
                Some(RegistryEvent::NewEntity { vk })
            }
            Transaction::Dot(d) => {
                let hash = *d.hash();
                if self.dots.contains_key(&hash) {
                    return None;
                }
                self.granted.entry(*d.giver()).or_default().push(hash);
                let event = RegistryEvent::NewDot {
                    hash,
                    giver: *d.giver(),
                    receiver: *d.receiver(),
                    nsvk: d.access().map(|g| g.mvk),
                };
                self.dots.insert(hash, d);
                Some(event)
            }
            Transaction::Chain(hashes) => {
                self.chains.insert(chain_hash_of(&hashes), hashes);
                None
            }
            Transaction::Revocation(r) => {
                let target = *r.target();
                if !self.revoked.insert(target) {
                    return None;
                }
                if self.dots.contains_key(&target) {
                    Some(RegistryEvent::NewDotRevocation { hash: target })
                } else {
                    Some(RegistryEvent::NewEntityRevocation { vk: target })
                }
            }
            Transaction::Alias { key, value } => {
                self.aliases.entry(key).or_insert(value);
                None
            }
            Transaction::Transfer { from, to, amount } => {
                let have = self.balances.get(&from).copied().unwrap_or(0);
                if have < amount {
                    warn!(from = %fmt_key(&from), "transfer dropped at inclusion, insufficient funds");
                    return None;
                }
                self.balances.insert(from, have - amount);
                *self.balances.entry(to).or_insert(0) += amount;
                None
            }
            Transaction::Offer { drvk, nsvk } => {
                self.offers.entry((drvk, nsvk)).or_insert(false);
                None
            }
            Transaction::Accept { drvk, nsvk } => {
                if let Some(accepted) = self.offers.get_mut(&(drvk, nsvk)) {
                    *accepted = true;
                }
                None
            }
            Transaction::RetractOffer { drvk, nsvk } => {
                self.offers.remove(&(drvk, nsvk));
                None
            }
            Transaction::RetractAcceptance { drvk, nsvk } => {
                if let Some(accepted) = self.offers.get_mut(&(drvk, nsvk)) {
                    *accepted = false;
                }
                None
            }
            Transaction::Srv { drvk, record } => {
                self.srv.insert(drvk, record);
                None
            }
        }
    }
}

/// Registry that lives entirely in process memory.
pub struct InMemoryRegistry {
    ledger: Mutex<Ledger>,
    blocks: broadcast::Sender<u64>,
}

impl InMemoryRegistry {
    pub fn new(params: TransactionParams) -> Self {
        let (blocks, _) = broadcast::channel(1024);
        Self {
            ledger: Mutex::new(Ledger {
                height: 0,
                last_block_at: Instant::now(),
                params,
                entities: HashMap::new(),
                dots: HashMap::new(),
                granted: HashMap::new(),
                chains: HashMap::new(),
                revoked: HashSet::new(),
                aliases: HashMap::new(),
                next_short_alias: 1,
                balances: HashMap::new(),
                offers: BTreeMap::new(),
                srv: HashMap::new(),
                events: BTreeMap::new(),
                pending: Vec::new(),
            }),
            blocks,
        }
    }

    /// Produce one block, applying every queued transaction.
    pub fn mine_block(&self) -> u64 {
        let height = {
            let mut ledger = self.ledger.lock();
            ledger.height += 1;
            ledger.last_block_at = Instant::now();
            let pending = std::mem::take(&mut ledger.pending);
            let count = pending.len();
            let events: Vec<RegistryEvent> =
                pending.into_iter().filter_map(|tx| ledger.apply(tx)).collect();
            let height = ledger.height;
            if !events.is_empty() {
                ledger.events.insert(height, events);
            }
            trace!(height, transactions = count, "mined block");
            height
        };
        // No receivers is fine.
        let _ = self.blocks.send(height);
        height
    }

    /// Mine a block every `interval` until shutdown is signalled.
    pub fn spawn_block_producer(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "block producer started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.mine_block();
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("block producer stopped");
        })
    }

    /// Give `account` funds out of thin air.
    pub fn credit(&self, account: &Vk, amount: u128) {
        *self.ledger.lock().balances.entry(*account).or_insert(0) += amount;
    }

    /// Queue `tx` and wait for it to be confirmed.
    async fn submit(&self, tx: Transaction) -> BwResult<()> {
        let mut rx = self.blocks.subscribe();
        let (start, params) = {
            let mut ledger = self.ledger.lock();
            debug!(height = ledger.height, kind = tx_kind(&tx), "transaction submitted");
            ledger.pending.push(tx);
            (ledger.height, ledger.params)
        };
        let confirmed_at = start + 1 + params.confirmations;
        let give_up_after = start + params.timeout_blocks;
        let wall = Duration::from_secs(20 * params.timeout_blocks);

        let wait = async {
            loop {
                let height = match rx.recv().await {
                    Ok(h) => h,
                    Err(broadcast::error::RecvError::Lagged(_)) => self.current_block(),
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(BwError::new(
                            StatusCode::BlockChainGenericError,
                            "block stream closed",
                        ))
                    }
                };
                if height >= confirmed_at {
                    return Ok(());
                }
                if height > give_up_after {
                    return Err(BwError::new(
                        StatusCode::TransactionConfirmationTimeout,
                        format!("not confirmed within {} blocks", params.timeout_blocks),
                    ));
                }
            }
        };
        tokio::time::timeout(wall, wait).await.map_err(|_| {
            BwError::new(
                StatusCode::TransactionTimeout,
                format!("not confirmed within {}s", wall.as_secs()),
            )
        })?
    }
}

fn tx_kind(tx: &Transaction) -> &'static str {
    match tx {
        Transaction::Entity(_) => "entity",
        Transaction::Dot(_) => "dot",
        Transaction::Chain(_) => "chain",
        Transaction::Revocation(_) => "revocation",
        Transaction::Alias { .. } => "alias",
        Transaction::Transfer { .. } => "transfer",
        Transaction::Offer { .. } => "offer",
        Transaction::Accept { .. } => "accept",
        Transaction::RetractOffer { .. } => "retract-offer",
        Transaction::RetractAcceptance { .. } => "retract-acceptance",
        Transaction::Srv { .. } => "srv",
    }
}

fn require_key(e: &Entity) -> BwResult<()> {
    match e.sk() {
        Some(_) => Ok(()),
        None => Err(BwError::new(
            StatusCode::NoEntity,
            "operation needs an entity with its signing key",
        )),
    }
}

#[async_trait]
impl RegistryProvider for InMemoryRegistry {
    async fn resolve_entity(&self, vk: &Vk) -> BwResult<(Option<Arc<Entity>>, ValidityState)> {
        let ledger = self.ledger.lock();
        Ok((ledger.entities.get(vk).cloned(), ledger.entity_state(vk)))
    }

    async fn resolve_dot(&self, hash: &Hash32) -> BwResult<(Option<Arc<Dot>>, ValidityState)> {
        let ledger = self.ledger.lock();
        Ok((ledger.dots.get(hash).cloned(), ledger.dot_state(hash)))
    }

    async fn resolve_access_chain(
        &self,
        hash: &Hash32,
    ) -> BwResult<(Option<DChain>, ValidityState)> {
        let ledger = self.ledger.lock();
        let Some(hashes) = ledger.chains.get(hash) else {
            return Ok((None, ValidityState::Unknown));
        };
        let state = hashes
            .iter()
            .fold(ValidityState::Valid, |s, h| s.combine(ledger.dot_state(h)));
        let chain = DChain::from_dot_hashes(true, hashes.clone())?;
        Ok((Some(chain), state))
    }

    async fn resolve_dots_from_vk(&self, vk: &Vk) -> BwResult<Vec<Hash32>> {
        Ok(self.ledger.lock().granted.get(vk).cloned().unwrap_or_default())
    }

    fn current_block(&self) -> u64 {
        self.ledger.lock().height
    }

    fn head_block_age(&self) -> Duration {
        self.ledger.lock().last_block_at.elapsed()
    }

    async fn events_between(&self, from: u64, to: u64) -> BwResult<Vec<BlockEvent>> {
        if to <= from {
            return Ok(Vec::new());
        }
        let ledger = self.ledger.lock();
        Ok(ledger
            .events
            .range(from + 1..=to)
            .flat_map(|(block, events)| {
                events.iter().map(move |event| BlockEvent {
                    block: *block,
                    event: event.clone(),
                })
            })
            .collect())
    }

    fn subscribe_blocks(&self) -> broadcast::Receiver<u64> {
        self.blocks.subscribe()
    }

    fn transaction_params(&self) -> TransactionParams {
        self.ledger.lock().params
    }

    fn set_transaction_params(&self, params: TransactionParams) -> BwResult<()> {
        if params.timeout_blocks < params.confirmations {
            return Err(BwError::new(
                StatusCode::BadOperation,
                "timeout must be at least the confirmation count",
            ));
        }
        self.ledger.lock().params = params;
        Ok(())
    }

    async fn publish_entity(&self, entity: &Entity) -> BwResult<()> {
        if !entity.sig_valid() {
            return Err(BwError::new(
                StatusCode::RegistryEntityInvalid,
                "entity signature does not verify",
            ));
        }
        let public = Entity::decode(entity.content())?;
        self.submit(Transaction::Entity(Arc::new(public))).await
    }

    async fn publish_dot(&self, dot: &Dot) -> BwResult<()> {
        if !dot.sig_valid() {
            return Err(BwError::new(
                StatusCode::RegistryDOTInvalid,
                "DOT signature does not verify",
            ));
        }
        self.submit(Transaction::Dot(Arc::new(dot.clone()))).await
    }

    async fn publish_chain(&self, chain: &DChain) -> BwResult<()> {
        if !chain.is_access() || !chain.is_elaborated() {
            return Err(BwError::new(
                StatusCode::RegistryChainInvalid,
                "only elaborated access chains can be published",
            ));
        }
        {
            let ledger = self.ledger.lock();
            if let Some(missing) = chain.dot_hashes().iter().find(|h| !ledger.dots.contains_key(*h)) {
                return Err(BwError::new(
                    StatusCode::RegistryChainInvalid,
                    format!("DOT {} is not in the registry", fmt_hash(missing)),
                ));
            }
        }
        self.submit(Transaction::Chain(chain.dot_hashes().to_vec()))
            .await
    }

    async fn publish_revocation(&self, revocation: &Revocation) -> BwResult<()> {
        {
            let ledger = self.ledger.lock();
            let target = revocation.target();
            if let Some(dot) = ledger.dots.get(target) {
                if ledger.dot_state(target) != ValidityState::Valid {
                    return Err(BwError::new(
                        StatusCode::NotRevokable,
                        "DOT is not valid in the registry",
                    ));
                }
                if !revocation.is_valid_for_dot(dot) {
                    return Err(BwError::new(
                        StatusCode::InvalidRevocation,
                        "revocation is not valid for this DOT",
                    ));
                }
            } else if let Some(entity) = ledger.entities.get(target) {
                if ledger.entity_state(target) != ValidityState::Valid {
                    return Err(BwError::new(
                        StatusCode::NotRevokable,
                        "entity is not valid in the registry",
                    ));
                }
                if !revocation.is_valid_for_entity(entity) {
                    return Err(BwError::new(
                        StatusCode::InvalidRevocation,
                        "revocation is not valid for this entity",
                    ));
                }
            } else {
                return Err(BwError::new(
                    StatusCode::NotRevokable,
                    "target is neither a DOT nor an entity in the registry",
                ));
            }
        }
        self.submit(Transaction::Revocation(Arc::new(revocation.clone())))
            .await
    }

    async fn create_short_alias(&self, value: [u8; 32]) -> BwResult<u64> {
        if value == [0u8; 32] {
            return Err(BwError::new(StatusCode::AliasError, "cannot alias to zero"));
        }
        let n = {
            let mut ledger = self.ledger.lock();
            let n = ledger.next_short_alias;
            ledger.next_short_alias += 1;
            n
        };
        self.submit(Transaction::Alias {
            key: short_alias_key(n),
            value,
        })
        .await?;
        Ok(n)
    }

    async fn create_long_alias(&self, key: [u8; 32], value: [u8; 32]) -> BwResult<()> {
        if value == [0u8; 32] {
            return Err(BwError::new(StatusCode::AliasError, "cannot alias to zero"));
        }
        if let Some(existing) = self.ledger.lock().aliases.get(&key) {
            let how = if *existing == value { "the same" } else { "a different" };
            return Err(BwError::new(
                StatusCode::AliasExists,
                format!("alias exists with {how} value"),
            ));
        }
        self.submit(Transaction::Alias { key, value }).await?;
        match self.ledger.lock().aliases.get(&key) {
            Some(v) if *v == value => Ok(()),
            _ => Err(BwError::new(
                StatusCode::AliasError,
                "created alias contents do not match",
            )),
        }
    }

    async fn resolve_alias(&self, key: &[u8; 32]) -> BwResult<Option<[u8; 32]>> {
        Ok(self.ledger.lock().aliases.get(key).copied())
    }

    async fn resolve_short_alias(&self, alias: u64) -> BwResult<Option<[u8; 32]>> {
        self.resolve_alias(&short_alias_key(alias)).await
    }

    async fn transfer(&self, from: &Vk, to: &Vk, amount: u128) -> BwResult<()> {
        let have = self.ledger.lock().balances.get(from).copied().unwrap_or(0);
        if have < amount {
            return Err(BwError::new(
                StatusCode::BlockChainGenericError,
                format!("insufficient funds: have {have}, need {amount}"),
            ));
        }
        self.submit(Transaction::Transfer {
            from: *from,
            to: *to,
            amount,
        })
        .await
    }

    async fn balance(&self, account: &Vk) -> BwResult<u128> {
        Ok(self.ledger.lock().balances.get(account).copied().unwrap_or(0))
    }

    async fn new_router_offer(&self, dr: &Entity, nsvk: &Vk) -> BwResult<()> {
        require_key(dr)?;
        self.submit(Transaction::Offer {
            drvk: *dr.vk(),
            nsvk: *nsvk,
        })
        .await
    }

    async fn accept_router_offer(&self, ns: &Entity, drvk: &Vk) -> BwResult<()> {
        require_key(ns)?;
        let key = (*drvk, *ns.vk());
        if !self.ledger.lock().offers.contains_key(&key) {
            return Err(BwError::new(
                StatusCode::BlockChainGenericError,
                format!("no routing offer from {}", fmt_key(drvk)),
            ));
        }
        self.submit(Transaction::Accept {
            drvk: key.0,
            nsvk: key.1,
        })
        .await
    }

    async fn retract_router_offer(&self, dr: &Entity, nsvk: &Vk) -> BwResult<()> {
        require_key(dr)?;
        let key = (*dr.vk(), *nsvk);
        if !self.ledger.lock().offers.contains_key(&key) {
            return Err(BwError::new(
                StatusCode::BlockChainGenericError,
                "no such routing offer",
            ));
        }
        self.submit(Transaction::RetractOffer {
            drvk: key.0,
            nsvk: key.1,
        })
        .await
    }

    async fn retract_router_acceptance(&self, ns: &Entity, drvk: &Vk) -> BwResult<()> {
        require_key(ns)?;
        let key = (*drvk, *ns.vk());
        if self.ledger.lock().offers.get(&key) != Some(&true) {
            return Err(BwError::new(
                StatusCode::BlockChainGenericError,
                "routing offer was not accepted",
            ));
        }
        self.submit(Transaction::RetractAcceptance {
            drvk: key.0,
            nsvk: key.1,
        })
        .await
    }

    async fn list_router_offers(&self, nsvk: &Vk) -> BwResult<Vec<RouterOffer>> {
        Ok(self
            .ledger
            .lock()
            .offers
            .iter()
            .filter(|((_, ns), _)| ns == nsvk)
            .map(|((drvk, ns), accepted)| RouterOffer {
                drvk: *drvk,
                nsvk: *ns,
                accepted: *accepted,
            })
            .collect())
    }

    async fn update_srv_record(&self, dr: &Entity, record: &str) -> BwResult<()> {
        require_key(dr)?;
        self.submit(Transaction::Srv {
            drvk: *dr.vk(),
            record: record.to_string(),
        })
        .await
    }

    async fn srv_record(&self, drvk: &Vk) -> BwResult<Option<String>> {
        Ok(self.ledger.lock().srv.get(drvk).cloned())
    }
}
