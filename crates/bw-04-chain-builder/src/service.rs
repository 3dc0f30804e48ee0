//! # Chain Builder Service
//!
//! Breadth-first walk from the namespace over valid access DOTs. Every
//! scenario that reaches the target (or everybody, when accepted) becomes a
//! chain; identical chains reached by different orders are reported once.
//! Results come back shortest first.

use crate::domain::{BuildRequest, Scenario};
use crate::ports::outbound::GrantSource;
use bw_01_objects::{DChain, Dot};
use shared_crypto::{fmt_hash, fmt_key};
use shared_types::{
    analyze_suffix, restrict_by, BwError, BwResult, Hash32, StatusCode, ValidityState, Vk,
    EVERYBODY_VK,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace};

/// Longest chain the builder will explore. A DOT TTL is a single byte.
pub const MAX_CHAIN_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct ChainBuilderConfig {
    /// Builds allowed to run at once.
    pub workers: usize,
    pub max_depth: usize,
}

impl Default for ChainBuilderConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_depth: MAX_CHAIN_DEPTH,
        }
    }
}

pub struct ChainBuilder {
    source: Arc<dyn GrantSource>,
    permits: Semaphore,
    config: ChainBuilderConfig,
}

impl ChainBuilder {
    pub fn new(source: Arc<dyn GrantSource>, config: ChainBuilderConfig) -> Self {
        Self {
            source,
            permits: Semaphore::new(config.workers.max(1)),
            config,
        }
    }

    /// Find access chains for `req`. No chains is an empty list, not an
    /// error; a malformed URI is.
    pub async fn build(&self, req: &BuildRequest) -> BwResult<Vec<DChain>> {
        if analyze_suffix(&req.suffix).is_none() {
            return Err(BwError::new(
                StatusCode::BadURI,
                format!("bad URI {:?}", req.suffix),
            ));
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BwError::new(StatusCode::ChainBuildFailed, "chain builder closed"))?;

        let key = req.cache_key();
        if let Some(chains) = self.source.cached_chains(&key).await? {
            debug!(nsvk = %fmt_key(&req.nsvk), suffix = %req.suffix, chains = chains.len(), "chain cache hit");
            return Ok(chains);
        }

        let chains = self.search(req).await?;
        info!(
            nsvk = %fmt_key(&req.nsvk),
            suffix = %req.suffix,
            target = %fmt_key(&req.target),
            chains = chains.len(),
            "chain build complete"
        );
        self.source.cache_chains(key, chains.clone());
        Ok(chains)
    }

    async fn search(&self, req: &BuildRequest) -> BwResult<Vec<DChain>> {
        let mut edges = EdgeCache::default();
        let mut frontier: VecDeque<Scenario> = VecDeque::new();
        let mut found: Vec<DChain> = Vec::new();
        let mut seen: HashSet<Hash32> = HashSet::new();

        for dot in edges.from(self.source.as_ref(), req, &req.nsvk).await? {
            if let Some(s) = Scenario::start(dot, &req.suffix) {
                self.place(req, s, &mut frontier, &mut found, &mut seen)?;
            }
        }

        while let Some(s) = frontier.pop_front() {
            if s.depth() >= self.config.max_depth {
                continue;
            }
            let from = *s.terminal();
            for dot in edges.from(self.source.as_ref(), req, &from).await? {
                if dot.receiver() == &req.nsvk || s.visits(dot.receiver()) {
                    continue;
                }
                if let Some(next) = s.extend(dot) {
                    self.place(req, next, &mut frontier, &mut found, &mut seen)?;
                }
            }
        }
        Ok(found)
    }

    /// Record a finished scenario or queue it for expansion.
    fn place(
        &self,
        req: &BuildRequest,
        s: Scenario,
        frontier: &mut VecDeque<Scenario>,
        found: &mut Vec<DChain>,
        seen: &mut HashSet<Hash32>,
    ) -> BwResult<()> {
        if !s.grants(&req.permissions) {
            return Ok(());
        }
        let terminal = *s.terminal();
        if terminal == req.target || (req.accept_everybody && terminal == EVERYBODY_VK) {
            let chain = s.into_chain()?;
            if seen.insert(*chain.chain_hash()) {
                debug!(chain = %fmt_hash(chain.chain_hash()), "found chain");
                found.push(chain);
            }
        } else if terminal != EVERYBODY_VK {
            trace!(depth = s.depth(), terminal = %fmt_key(&terminal), "queueing scenario");
            frontier.push_back(s);
        }
        Ok(())
    }
}

/// Useful outgoing DOTs per VK, fetched once per build.
#[derive(Default)]
struct EdgeCache {
    by_vk: HashMap<Vk, Vec<Arc<Dot>>>,
}

impl EdgeCache {
    async fn from(
        &mut self,
        source: &dyn GrantSource,
        req: &BuildRequest,
        vk: &Vk,
    ) -> BwResult<Vec<Arc<Dot>>> {
        if let Some(dots) = self.by_vk.get(vk) {
            return Ok(dots.clone());
        }
        let links = source.granted_dots(vk).await?;
        let useful: Vec<Arc<Dot>> = links
            .into_iter()
            .filter(|link| {
                if link.state != ValidityState::Valid {
                    trace!(dot = %fmt_hash(link.dot.hash()), state = link.state.as_str(), "skipping DOT");
                    return false;
                }
                let Some(grant) = link.dot.access() else {
                    return false;
                };
                grant.mvk == req.nsvk
                    && req.permissions.is_subset_of(&grant.permissions)
                    && restrict_by(&req.suffix, &grant.suffix).is_some()
            })
            .map(|link| link.dot)
            .collect();
        self.by_vk.insert(*vk, useful.clone());
        Ok(useful)
    }
}
