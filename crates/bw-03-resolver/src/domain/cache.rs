//! Resolution caches.
//!
//! All maps live in one [`ResolutionCaches`] value so that the service can
//! guard them with a single lock. Nothing in here talks to the registry.

use bw_01_objects::{DChain, Dot, Entity};
use shared_types::{AccessPermissions, Hash32, Timestamp, ValidityState, Vk};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A DOT together with its current registry state.
#[derive(Debug, Clone)]
pub struct DotLink {
    pub dot: Arc<Dot>,
    pub state: ValidityState,
}

/// Key of a set of built chains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainCacheKey {
    pub nsvk: Vk,
    pub suffix: String,
    /// Permission string form, so the key hashes stably.
    pub permissions: String,
    pub target: Vk,
}

impl ChainCacheKey {
    pub fn new(nsvk: Vk, suffix: &str, permissions: &AccessPermissions, target: Vk) -> Self {
        Self {
            nsvk,
            suffix: suffix.to_string(),
            permissions: permissions.to_perm_string(),
            target,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResolutionCaches {
    pub(crate) entities: HashMap<Vk, (Arc<Entity>, ValidityState)>,
    pub(crate) dots: HashMap<Hash32, (Arc<Dot>, ValidityState)>,
    /// giver VK -> cached DOT hashes it gave
    pub(crate) dot_from_inv: HashMap<Vk, HashSet<Hash32>>,
    /// receiver VK -> cached DOT hashes it received
    pub(crate) dot_to_inv: HashMap<Vk, HashSet<Hash32>>,
    /// giver VK -> every DOT hash it has ever granted, once enumerated
    pub(crate) dot_from_complete: HashMap<Vk, Vec<Hash32>>,
    pub(crate) chains: HashMap<Vk, HashMap<ChainCacheKey, Vec<DChain>>>,
    /// nsvk -> block height before which built chains are not cached
    pub(crate) holdoff: HashMap<Vk, u64>,
}

impl ResolutionCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, vk: &Vk) -> Option<(Arc<Entity>, ValidityState)> {
        self.entities.get(vk).cloned()
    }

    pub fn insert_entity(&mut self, entity: Arc<Entity>, state: ValidityState) {
        self.entities.insert(*entity.vk(), (entity, state));
    }

    pub fn dot(&self, hash: &Hash32) -> Option<(Arc<Dot>, ValidityState)> {
        self.dots.get(hash).cloned()
    }

    /// Cache a DOT and index it by giver and receiver.
    pub fn insert_dot(&mut self, dot: Arc<Dot>, state: ValidityState) {
        let hash = *dot.hash();
        self.dot_from_inv
            .entry(*dot.giver())
            .or_default()
            .insert(hash);
        self.dot_to_inv
            .entry(*dot.receiver())
            .or_default()
            .insert(hash);
        self.dots.insert(hash, (dot, state));
    }

    pub fn granted_complete(&self, vk: &Vk) -> Option<Vec<Hash32>> {
        self.dot_from_complete.get(vk).cloned()
    }

    pub fn insert_granted_complete(&mut self, vk: Vk, hashes: Vec<Hash32>) {
        self.dot_from_complete.insert(vk, hashes);
    }

    /// Drop a DOT and its giver/receiver index entries. Chains are not
    /// touched: they are rechecked on use.
    pub fn flush_dot(&mut self, hash: &Hash32) {
        let Some((dot, _)) = self.dots.remove(hash) else {
            return;
        };
        unindex(&mut self.dot_from_inv, dot.giver(), hash);
        unindex(&mut self.dot_to_inv, dot.receiver(), hash);
        debug!(dot = %shared_crypto::fmt_hash(hash), "flushed DOT");
    }

    /// Drop an entity and every cached DOT that names it.
    pub fn flush_entity(&mut self, vk: &Vk) {
        self.entities.remove(vk);
        let mut affected: HashSet<Hash32> = self.dot_to_inv.remove(vk).unwrap_or_default();
        affected.extend(self.dot_from_inv.remove(vk).unwrap_or_default());
        for hash in &affected {
            self.flush_dot(hash);
        }
        debug!(
            entity = %shared_crypto::fmt_key(vk),
            dots = affected.len(),
            "flushed entity"
        );
    }

    pub fn flush_granted_from(&mut self, vk: &Vk) {
        self.dot_from_complete.remove(vk);
    }

    /// Drop every built chain on `nsvk` and hold off new ones until
    /// `until_block` has passed.
    pub fn flush_chain_nsvk(&mut self, nsvk: &Vk, until_block: u64) {
        self.chains.remove(nsvk);
        self.holdoff.insert(*nsvk, until_block);
    }

    /// Store built chains unless the namespace is held off. A holdoff
    /// whose block has passed is lifted. Returns whether the chains were
    /// cached.
    pub fn cache_chains(&mut self, key: ChainCacheKey, chains: Vec<DChain>, current_block: u64) -> bool {
        if let Some(until) = self.holdoff.get(&key.nsvk).copied() {
            if current_block > until {
                debug!(nsvk = %shared_crypto::fmt_key(&key.nsvk), "lifting holdoff");
                self.holdoff.remove(&key.nsvk);
            } else {
                debug!(nsvk = %shared_crypto::fmt_key(&key.nsvk), until, "observing holdoff");
                return false;
            }
        }
        self.chains.entry(key.nsvk).or_default().insert(key, chains);
        true
    }

    pub fn chains(&self, key: &ChainCacheKey) -> Option<Vec<DChain>> {
        self.chains.get(&key.nsvk).and_then(|m| m.get(key)).cloned()
    }

    /// Flush everything past its expiry and return the time until the next
    /// remaining expiry, capped at `max_wait`.
    pub fn flush_expired(&mut self, now: &Timestamp, max_wait: Duration) -> Duration {
        let expired_entities: Vec<Vk> = self
            .entities
            .iter()
            .filter(|(_, (e, _))| e.is_expired(now))
            .map(|(vk, _)| *vk)
            .collect();
        for vk in &expired_entities {
            self.flush_entity(vk);
        }
        let expired_dots: Vec<Hash32> = self
            .dots
            .iter()
            .filter(|(_, (d, _))| d.is_expired(now))
            .map(|(h, _)| *h)
            .collect();
        for hash in &expired_dots {
            self.flush_dot(hash);
        }

        let next = self
            .entities
            .values()
            .filter_map(|(e, _)| e.expiry().copied())
            .chain(self.dots.values().filter_map(|(d, _)| d.expiry().copied()))
            .min();
        match next {
            Some(t) => (t - *now).to_std().unwrap_or(Duration::ZERO).min(max_wait),
            None => max_wait,
        }
    }

    pub fn is_held_off(&self, nsvk: &Vk) -> bool {
        self.holdoff.contains_key(nsvk)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn dot_count(&self) -> usize {
        self.dots.len()
    }
}

fn unindex(inv: &mut HashMap<Vk, HashSet<Hash32>>, vk: &Vk, hash: &Hash32) {
    if let Some(set) = inv.get_mut(vk) {
        set.remove(hash);
        if set.is_empty() {
            inv.remove(vk);
        }
    }
}
