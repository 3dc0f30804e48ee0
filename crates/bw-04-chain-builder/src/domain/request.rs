use bw_03_resolver::ChainCacheKey;
use shared_types::{AccessPermissions, Vk};

/// Chains from `nsvk` to `target` granting `permissions` on `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub nsvk: Vk,
    pub suffix: String,
    pub permissions: AccessPermissions,
    pub target: Vk,
    /// Accept a chain that ends in a grant to everybody.
    pub accept_everybody: bool,
}

impl BuildRequest {
    pub fn new(nsvk: Vk, suffix: impl Into<String>, permissions: AccessPermissions, target: Vk) -> Self {
        Self {
            nsvk,
            suffix: suffix.into(),
            permissions,
            target,
            accept_everybody: true,
        }
    }

    pub fn cache_key(&self) -> ChainCacheKey {
        ChainCacheKey::new(self.nsvk, &self.suffix, &self.permissions, self.target)
    }
}
