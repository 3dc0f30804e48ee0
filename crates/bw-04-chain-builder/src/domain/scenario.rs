//! A partial chain and the grant it carries so far.
//!
//! Extending a scenario applies the same rules as chain analysis: the URI
//! is restricted by each DOT, permissions are reduced, and the TTL drops
//! by one per hop and is capped by each DOT's own TTL.

use bw_01_objects::{DChain, Dot};
use shared_types::{restrict_by, AccessPermissions, BwResult, Vk};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Scenario {
    dots: Vec<Arc<Dot>>,
    suffix: String,
    permissions: AccessPermissions,
    ttl: u8,
}

impl Scenario {
    /// Start from a DOT granted by the namespace. `None` when the DOT is
    /// not an access grant or its URI cannot cover `suffix`.
    pub fn start(dot: Arc<Dot>, suffix: &str) -> Option<Self> {
        let grant = dot.access()?;
        let suffix = restrict_by(suffix, &grant.suffix)?;
        let permissions = grant.permissions;
        let ttl = dot.ttl();
        Some(Self {
            dots: vec![dot],
            suffix,
            permissions,
            ttl,
        })
    }

    /// A copy extended by `dot`, or `None` if the TTL is spent or the URI
    /// becomes overconstrained.
    pub fn extend(&self, dot: Arc<Dot>) -> Option<Self> {
        if self.ttl == 0 {
            return None;
        }
        let grant = dot.access()?;
        let suffix = restrict_by(&self.suffix, &grant.suffix)?;
        let mut permissions = self.permissions;
        permissions.reduce_by(&grant.permissions);
        let ttl = (self.ttl - 1).min(dot.ttl());
        let mut dots = self.dots.clone();
        dots.push(dot);
        Some(Self {
            dots,
            suffix,
            permissions,
            ttl,
        })
    }

    pub fn terminal(&self) -> &Vk {
        // never empty: built by start()
        self.dots[self.dots.len() - 1].receiver()
    }

    /// Whether `vk` already gives or receives a DOT on this path.
    pub fn visits(&self, vk: &Vk) -> bool {
        self.dots
            .iter()
            .any(|d| d.giver() == vk || d.receiver() == vk)
    }

    pub fn depth(&self) -> usize {
        self.dots.len()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn grants(&self, required: &AccessPermissions) -> bool {
        required.is_subset_of(&self.permissions)
    }

    pub fn into_chain(self) -> BwResult<DChain> {
        DChain::from_dots(true, self.dots)
    }
}
