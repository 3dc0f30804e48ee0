//! Outbound port of the chain builder.

use async_trait::async_trait;
use bw_01_objects::DChain;
use bw_03_resolver::{ChainCacheKey, DotLink};
use shared_types::{BwResult, Vk};

// =============================================================================
// GRANT SOURCE
// =============================================================================

/// Graph edges for the search, plus the built-chain cache.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Every DOT granted by `vk`, with its current state.
    async fn granted_dots(&self, vk: &Vk) -> BwResult<Vec<DotLink>>;

    /// Previously built chains for `key` that are still valid, or `None` on
    /// a miss.
    async fn cached_chains(&self, key: &ChainCacheKey) -> BwResult<Option<Vec<DChain>>>;

    /// Offer freshly built chains to the cache. May be ignored.
    fn cache_chains(&self, key: ChainCacheKey, chains: Vec<DChain>);
}
