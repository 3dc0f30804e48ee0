//! Resolver-backed grant source.

use crate::ports::outbound::GrantSource;
use async_trait::async_trait;
use bw_01_objects::DChain;
use bw_03_resolver::{ChainCacheKey, DotLink, Resolver};
use shared_types::{BwResult, Vk};

#[async_trait]
impl GrantSource for Resolver {
    async fn granted_dots(&self, vk: &Vk) -> BwResult<Vec<DotLink>> {
        self.resolve_granted_dots(vk).await
    }

    async fn cached_chains(&self, key: &ChainCacheKey) -> BwResult<Option<Vec<DChain>>> {
        self.resolve_built_chain(key).await
    }

    fn cache_chains(&self, key: ChainCacheKey, chains: Vec<DChain>) {
        self.cache_built_chains(key, chains);
    }
}
