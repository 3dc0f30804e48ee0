//! # Object Store Service
//!
//! Typed view over a [`KeyValueStore`]: DOTs, chains and entities keyed by
//! hash or VK, and persisted messages keyed by their concrete topic.

use crate::domain::errors::KVStoreError;
use crate::domain::keys::{self, CF_CHAIN, CF_DOT, CF_ENTITY, CF_MESSAGE};
use crate::ports::outbound::KeyValueStore;
use bw_01_objects::{DChain, Dot, Entity, Message};
use parking_lot::RwLock;
use shared_crypto::fmt_key;
use shared_types::uri::split_cells;
use shared_types::{topic_match, BwResult, Hash32, Vk};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

fn corrupt(what: &str, e: impl std::fmt::Display) -> KVStoreError {
    KVStoreError::CorruptionError {
        message: format!("stored {what} does not decode: {e}"),
    }
}

/// Object store over a backend chosen at runtime.
pub type DynObjectStore = ObjectStore<Box<dyn KeyValueStore>>;

/// Persistent store of routing objects and persisted messages.
pub struct ObjectStore<KV: KeyValueStore> {
    kv: RwLock<KV>,
}

impl<KV: KeyValueStore> ObjectStore<KV> {
    pub fn new(kv: KV) -> Self {
        Self {
            kv: RwLock::new(kv),
        }
    }

    // =========================================================================
    // DOTs
    // =========================================================================

    pub fn put_dot(&self, dot: &Dot) -> BwResult<()> {
        let mut value = Vec::with_capacity(1 + dot.content().len());
        value.push(dot.ro_num());
        value.extend_from_slice(dot.content());
        self.kv.write().put(&keys::key(CF_DOT, dot.hash()), &value)?;
        Ok(())
    }

    pub fn get_dot(&self, hash: &Hash32) -> BwResult<Option<Arc<Dot>>> {
        let Some(value) = self.kv.read().get(&keys::key(CF_DOT, hash))? else {
            return Ok(None);
        };
        let (ro, content) = value
            .split_first()
            .ok_or_else(|| corrupt("DOT", "empty value"))?;
        let dot = Dot::decode(*ro, content).map_err(|e| corrupt("DOT", e))?;
        Ok(Some(Arc::new(dot)))
    }

    pub fn has_dot(&self, hash: &Hash32) -> BwResult<bool> {
        Ok(self.kv.read().exists(&keys::key(CF_DOT, hash))?)
    }

    // =========================================================================
    // Chains
    // =========================================================================

    /// Store an elaborated chain under its chain hash. Attached DOTs are
    /// stored too. Unelaborated chains carry nothing worth keeping.
    pub fn put_chain(&self, chain: &DChain) -> BwResult<()> {
        if !chain.is_elaborated() {
            debug!("skipping store of unelaborated chain");
            return Ok(());
        }
        let mut value = Vec::with_capacity(1 + 32 * chain.num_hashes());
        value.push(chain.ro_num());
        value.extend_from_slice(&chain.content());
        self.kv
            .write()
            .put(&keys::key(CF_CHAIN, chain.chain_hash()), &value)?;
        for i in 0..chain.num_hashes() {
            if let Some(dot) = chain.dot(i) {
                self.put_dot(dot)?;
            }
        }
        Ok(())
    }

    /// Elaborated chain for `chain_hash`, with every DOT the store knows
    /// already attached.
    pub fn get_chain(&self, chain_hash: &Hash32) -> BwResult<Option<DChain>> {
        let Some(value) = self.kv.read().get(&keys::key(CF_CHAIN, chain_hash))? else {
            return Ok(None);
        };
        let (ro, content) = value
            .split_first()
            .ok_or_else(|| corrupt("chain", "empty value"))?;
        let mut chain = DChain::decode(*ro, content).map_err(|e| corrupt("chain", e))?;
        let hashes = chain.dot_hashes().to_vec();
        for (i, hash) in hashes.iter().enumerate() {
            if let Some(dot) = self.get_dot(hash)? {
                chain.set_dot(i, dot)?;
            }
        }
        Ok(Some(chain))
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Store the public form of an entity.
    pub fn put_entity(&self, entity: &Entity) -> BwResult<()> {
        self.kv
            .write()
            .put(&keys::key(CF_ENTITY, entity.vk()), entity.content())?;
        Ok(())
    }

    pub fn get_entity(&self, vk: &Vk) -> BwResult<Option<Arc<Entity>>> {
        let Some(value) = self.kv.read().get(&keys::key(CF_ENTITY, vk))? else {
            return Ok(None);
        };
        let entity = Entity::decode(&value).map_err(|e| corrupt("entity", e))?;
        Ok(Some(Arc::new(entity)))
    }

    pub fn has_entity(&self, vk: &Vk) -> BwResult<bool> {
        Ok(self.kv.read().exists(&keys::key(CF_ENTITY, vk))?)
    }

    // =========================================================================
    // Persisted messages
    // =========================================================================

    /// Persist `msg` under `mvk/suffix`. The last persisted message on a
    /// topic replaces the previous one.
    pub fn put_message(&self, mvk: &Vk, suffix: &str, msg: &Message) -> BwResult<()> {
        let topic = format!("{}/{}", fmt_key(mvk), suffix);
        debug!(topic = %topic, "persisting message");
        self.kv
            .write()
            .put(&keys::message_key(&topic), msg.encoded())?;
        Ok(())
    }

    pub fn get_message(&self, mvk: &Vk, suffix: &str) -> BwResult<Option<Message>> {
        let topic = format!("{}/{}", fmt_key(mvk), suffix);
        let Some(value) = self.kv.read().get(&keys::message_key(&topic))? else {
            return Ok(None);
        };
        let msg = Message::decode(&value).map_err(|e| corrupt("message", e))?;
        Ok(Some(msg))
    }

    /// Every persisted message in namespace `mvk` whose suffix matches
    /// `pattern`, as `(suffix, message)` in topic order.
    pub fn matching_messages(&self, mvk: &Vk, pattern: &str) -> BwResult<Vec<(String, Message)>> {
        let ns = fmt_key(mvk);
        let cells = split_cells(pattern);
        let literal: Vec<&str> = cells
            .iter()
            .take_while(|c| **c != "+" && **c != "*")
            .copied()
            .collect();
        let mut prefix = format!("{ns}/");
        if !literal.is_empty() {
            prefix.push_str(&literal.join("/"));
        }

        let pairs = self.kv.read().prefix_scan(&keys::message_key(&prefix))?;
        let mut out = Vec::new();
        for (key, value) in pairs {
            let Some(suffix) = keys::topic_of(&key).and_then(|t| t.strip_prefix(&ns)) else {
                continue;
            };
            let suffix = suffix.trim_start_matches('/');
            if !topic_match(&split_cells(suffix), &cells) {
                continue;
            }
            match Message::decode(&value) {
                Ok(msg) => out.push((suffix.to_string(), msg)),
                Err(e) => warn!(topic = %suffix, error = %e, "dropping undecodable persisted message"),
            }
        }
        Ok(out)
    }

    /// Distinct immediate children of `mvk/prefix` that lead to at least
    /// one persisted message, as full suffixes (`prefix/child`).
    pub fn list_children(&self, mvk: &Vk, prefix: &str) -> BwResult<Vec<String>> {
        let base = format!("{}/{}/", fmt_key(mvk), prefix);
        let scan_key = keys::message_key(&base);
        let pairs = self.kv.read().prefix_scan(&scan_key)?;
        let mut children = BTreeSet::new();
        for (key, _) in pairs {
            let Some(rest) = key.strip_prefix(scan_key.as_slice()) else {
                continue;
            };
            let Ok(rest) = std::str::from_utf8(rest) else {
                continue;
            };
            if let Some(child) = rest.split('/').next().filter(|c| !c.is_empty()) {
                children.insert(format!("{prefix}/{child}"));
            }
        }
        Ok(children.into_iter().collect())
    }

    /// Number of persisted messages across every namespace.
    pub fn message_count(&self) -> BwResult<usize> {
        Ok(self.kv.read().prefix_scan(CF_MESSAGE)?.len())
    }
}
