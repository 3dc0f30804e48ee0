//! DOT chains.
//!
//! An elaborated chain is the concatenation of its DOT hashes; the
//! unelaborated form is the SHA-256 of that concatenation. DOTs themselves
//! are attached lazily as they are resolved.

use super::dot::Dot;
use super::routing::ronum;
use shared_crypto::sha256;
use shared_types::{
    analyze_suffix, restrict_by, AccessPermissions, BwError, BwResult, Hash32, StatusCode, Vk,
    EVERYBODY_VK,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DChain {
    access: bool,
    elaborated: bool,
    chain_hash: Hash32,
    dot_hashes: Vec<Hash32>,
    dots: Vec<Option<Arc<Dot>>>,
}

impl PartialEq for DChain {
    fn eq(&self, other: &Self) -> bool {
        self.access == other.access
            && self.chain_hash == other.chain_hash
            && self.dot_hashes == other.dot_hashes
    }
}

impl Eq for DChain {}

/// What a structurally sound access chain grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAnalysis {
    /// Namespace named by the first DOT.
    pub mvk: Vk,
    /// Target suffix restricted by every DOT in turn.
    pub uri: String,
    pub permissions: AccessPermissions,
    /// TTL remaining after the last DOT.
    pub ttl: u8,
    /// Receiver of the last DOT.
    pub receiver: Vk,
}

/// SHA-256 over the concatenated DOT hashes.
pub fn chain_hash_of(dot_hashes: &[Hash32]) -> Hash32 {
    sha256(&dot_hashes.concat())
}

impl DChain {
    /// Build an elaborated chain from fully known DOTs.
    pub fn from_dots(access: bool, dots: Vec<Arc<Dot>>) -> BwResult<Self> {
        if dots.is_empty() {
            return Err(BwError::new(StatusCode::InvalidCoding, "empty DOT chain"));
        }
        if dots.iter().any(|d| d.is_access() != access) {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "DOT kind does not match chain kind",
            ));
        }
        let dot_hashes: Vec<Hash32> = dots.iter().map(|d| *d.hash()).collect();
        Ok(Self {
            access,
            elaborated: true,
            chain_hash: chain_hash_of(&dot_hashes),
            dot_hashes,
            dots: dots.into_iter().map(Some).collect(),
        })
    }

    /// An unelaborated chain known only by its hash.
    pub fn from_chain_hash(access: bool, chain_hash: Hash32) -> Self {
        Self {
            access,
            elaborated: false,
            chain_hash,
            dot_hashes: Vec::new(),
            dots: Vec::new(),
        }
    }

    /// Elaborated chain from DOT hashes, DOTs not yet attached.
    pub fn from_dot_hashes(access: bool, dot_hashes: Vec<Hash32>) -> BwResult<Self> {
        if dot_hashes.is_empty() {
            return Err(BwError::new(StatusCode::InvalidCoding, "empty DOT chain"));
        }
        Ok(Self {
            access,
            elaborated: true,
            chain_hash: chain_hash_of(&dot_hashes),
            dots: vec![None; dot_hashes.len()],
            dot_hashes,
        })
    }

    /// Parse the content of one of the four chain routing objects.
    pub fn decode(ro: u8, content: &[u8]) -> BwResult<Self> {
        match ro {
            ronum::ACCESS_CHAIN | ronum::PERMISSION_CHAIN => {
                if content.is_empty() || content.len() % 32 != 0 {
                    return Err(BwError::new(
                        StatusCode::InvalidCoding,
                        format!("chain content length {} is not a multiple of 32", content.len()),
                    ));
                }
                let hashes = content
                    .chunks_exact(32)
                    .map(|c| {
                        let mut h = [0u8; 32];
                        h.copy_from_slice(c);
                        h
                    })
                    .collect();
                Self::from_dot_hashes(ro == ronum::ACCESS_CHAIN, hashes)
            }
            ronum::ACCESS_CHAIN_HASH | ronum::PERMISSION_CHAIN_HASH => {
                let hash: Hash32 = content.try_into().map_err(|_| {
                    BwError::new(StatusCode::InvalidCoding, "chain hash must be 32 bytes")
                })?;
                Ok(Self::from_chain_hash(ro == ronum::ACCESS_CHAIN_HASH, hash))
            }
            other => Err(BwError::new(
                StatusCode::InvalidCoding,
                format!("routing object 0x{other:02x} is not a chain"),
            )),
        }
    }

    pub fn is_access(&self) -> bool {
        self.access
    }

    pub fn is_elaborated(&self) -> bool {
        self.elaborated
    }

    pub fn chain_hash(&self) -> &Hash32 {
        &self.chain_hash
    }

    pub fn num_hashes(&self) -> usize {
        self.dot_hashes.len()
    }

    pub fn dot_hashes(&self) -> &[Hash32] {
        &self.dot_hashes
    }

    pub fn dot_hash(&self, i: usize) -> Option<&Hash32> {
        self.dot_hashes.get(i)
    }

    pub fn dot(&self, i: usize) -> Option<&Arc<Dot>> {
        self.dots.get(i).and_then(Option::as_ref)
    }

    /// Attach the DOT at position `i`. The hash must match.
    pub fn set_dot(&mut self, i: usize, dot: Arc<Dot>) -> BwResult<()> {
        match self.dot_hashes.get(i) {
            Some(h) if h == dot.hash() => {
                self.dots[i] = Some(dot);
                Ok(())
            }
            _ => Err(BwError::new(
                StatusCode::InvalidCoding,
                format!("DOT does not belong at chain position {i}"),
            )),
        }
    }

    /// Attach `dot` wherever the chain refers to it.
    pub fn augment_by(&mut self, dot: &Arc<Dot>) {
        for (slot, hash) in self.dots.iter_mut().zip(&self.dot_hashes) {
            if hash == dot.hash() {
                *slot = Some(Arc::clone(dot));
            }
        }
    }

    /// Fill in the DOT hashes of an unelaborated chain.
    pub fn elaborate(&mut self, dot_hashes: Vec<Hash32>) -> BwResult<()> {
        if chain_hash_of(&dot_hashes) != self.chain_hash || dot_hashes.is_empty() {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "DOT hashes do not match chain hash",
            ));
        }
        self.dots = vec![None; dot_hashes.len()];
        self.dot_hashes = dot_hashes;
        self.elaborated = true;
        Ok(())
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.elaborated && self.dots.iter().all(Option::is_some)
    }

    /// All DOTs, if every one is attached.
    pub fn dots(&self) -> Option<Vec<Arc<Dot>>> {
        if !self.elaborated {
            return None;
        }
        self.dots.iter().cloned().collect()
    }

    /// Hash-only copy of this chain.
    pub fn unelaborated(&self) -> Self {
        Self::from_chain_hash(self.access, self.chain_hash)
    }

    pub fn ro_num(&self) -> u8 {
        match (self.access, self.elaborated) {
            (true, true) => ronum::ACCESS_CHAIN,
            (true, false) => ronum::ACCESS_CHAIN_HASH,
            (false, true) => ronum::PERMISSION_CHAIN,
            (false, false) => ronum::PERMISSION_CHAIN_HASH,
        }
    }

    /// Wire content for [`ro_num`](Self::ro_num).
    pub fn content(&self) -> Vec<u8> {
        if self.elaborated {
            self.dot_hashes.concat()
        } else {
            self.chain_hash.to_vec()
        }
    }

    /// Giver of the first DOT, when attached.
    pub fn giver(&self) -> Option<&Vk> {
        self.dot(0).map(|d| d.giver())
    }

    /// Receiver of the last DOT, when attached.
    pub fn receiver(&self) -> Option<&Vk> {
        self.num_hashes()
            .checked_sub(1)
            .and_then(|i| self.dot(i))
            .map(|d| d.receiver())
    }

    /// Every DOT attached and correctly signed.
    pub fn check_all_sigs(&self) -> bool {
        self.elaborated && self.dots.iter().all(|d| matches!(d, Some(d) if d.sig_valid()))
    }

    /// Walk an access chain for the target `suffix`.
    ///
    /// Checks that the chain starts at its namespace, that every link
    /// connects giver to previous receiver within one namespace, that the
    /// TTL holds, and folds URI restriction and permission reduction over
    /// all DOTs.
    pub fn analyze_access(&self, suffix: &str) -> BwResult<ChainAnalysis> {
        let dots = self.dots().ok_or_else(|| {
            BwError::new(StatusCode::Unresolvable, "chain has unresolved DOTs")
        })?;
        let (first, rest) = dots
            .split_first()
            .ok_or_else(|| BwError::new(StatusCode::Unresolvable, "empty chain"))?;
        let grant = first
            .access()
            .ok_or_else(|| BwError::from_code(StatusCode::NotAccessRO))?;
        let mut uri = restrict_by(suffix, &grant.suffix)
            .ok_or_else(|| BwError::new(StatusCode::BadURI, format!("bad URI {suffix}")))?;
        let mvk = grant.mvk;
        if first.giver() != &mvk {
            return Err(BwError::new(
                StatusCode::ChainOriginNotMVK,
                "first DOT is not granted by the namespace",
            ));
        }
        let mut permissions = grant.permissions;
        let mut ttl = first.ttl();
        let mut tail = *first.receiver();
        for dot in rest {
            if ttl == 0 {
                return Err(BwError::from_code(StatusCode::TTLExpired));
            }
            ttl -= 1;
            let grant = dot
                .access()
                .ok_or_else(|| BwError::from_code(StatusCode::NotAccessRO))?;
            permissions.reduce_by(&grant.permissions);
            ttl = ttl.min(dot.ttl());
            if dot.giver() != &tail || grant.mvk != mvk {
                return Err(BwError::from_code(StatusCode::BadLink));
            }
            uri = restrict_by(&uri, &grant.suffix).ok_or_else(|| {
                BwError::new(StatusCode::OverconstrainedURI, "overconstrained URI while merging")
            })?;
            tail = *dot.receiver();
        }
        if analyze_suffix(&uri).is_none() {
            return Err(BwError::new(
                StatusCode::OverconstrainedURI,
                "overconstrained URI after merging",
            ));
        }
        Ok(ChainAnalysis {
            mvk,
            uri,
            permissions,
            ttl,
            receiver: tail,
        })
    }

    /// Is this chain structurally valid for `(mvk, suffix, required, target)`?
    ///
    /// Registry state of the DOTs and entities is not consulted here.
    pub fn valid_on(
        &self,
        mvk: &Vk,
        suffix: &str,
        required: &AccessPermissions,
        target: &Vk,
    ) -> BwResult<ChainAnalysis> {
        let analysis = self.analyze_access(suffix)?;
        if &analysis.mvk != mvk {
            return Err(BwError::from_code(StatusCode::MVKMismatch));
        }
        if !required.is_subset_of(&analysis.permissions) {
            return Err(BwError::new(
                StatusCode::BadPermissions,
                format!("require {required}, chain grants {}", analysis.permissions),
            ));
        }
        if &analysis.receiver != target && analysis.receiver != EVERYBODY_VK {
            return Err(BwError::new(
                StatusCode::OriginVKMismatch,
                "chain does not end at the target",
            ));
        }
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codec::Metadata;
    use crate::domain::dot::{AccessGrant, DotBody, DotParams};
    use crate::domain::entity::Entity;

    fn grant(from: &Entity, to: &Vk, mvk: &Vk, suffix: &str, perms: &str, ttl: u8) -> Arc<Dot> {
        Arc::new(
            Dot::sign(
                from.sk().unwrap(),
                DotParams {
                    receiver: *to,
                    ttl,
                    meta: Metadata::default(),
                    body: DotBody::Access(AccessGrant {
                        mvk: *mvk,
                        suffix: suffix.into(),
                        permissions: AccessPermissions::parse(perms).unwrap(),
                    }),
                },
            )
            .unwrap(),
        )
    }

    struct Fixture {
        ns: Entity,
        mid: Entity,
        publisher: Entity,
    }

    fn fixture() -> Fixture {
        Fixture {
            ns: Entity::create(Metadata::default()).unwrap(),
            mid: Entity::create(Metadata::default()).unwrap(),
            publisher: Entity::create(Metadata::default()).unwrap(),
        }
    }

    #[test]
    fn test_chain_hash_is_hash_of_dot_hashes() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/+/c", "P", 5);
        let d2 = grant(&f.mid, f.publisher.vk(), f.ns.vk(), "a/b/+", "P", 4);
        let chain = DChain::from_dots(true, vec![d1.clone(), d2.clone()]).unwrap();
        let mut concat = d1.hash().to_vec();
        concat.extend_from_slice(d2.hash());
        assert_eq!(chain.chain_hash(), &sha256(&concat));
        assert_eq!(chain.ro_num(), ronum::ACCESS_CHAIN);

        let decoded = DChain::decode(ronum::ACCESS_CHAIN, &chain.content()).unwrap();
        assert_eq!(decoded, chain);
        assert!(!decoded.is_fully_resolved());
    }

    #[test]
    fn test_augment_and_elaborate() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/*", "P", 5);
        let full = DChain::from_dots(true, vec![d1.clone()]).unwrap();
        let mut hashed = full.unelaborated();
        assert_eq!(hashed.ro_num(), ronum::ACCESS_CHAIN_HASH);
        assert!(hashed.dots().is_none());

        assert!(hashed.elaborate(vec![[0u8; 32]]).is_err());
        hashed.elaborate(vec![*d1.hash()]).unwrap();
        hashed.augment_by(&d1);
        assert!(hashed.is_fully_resolved());
        assert!(hashed.check_all_sigs());
    }

    #[test]
    fn test_valid_chain_analysis() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/+/c", "P", 5);
        let d2 = grant(&f.mid, f.publisher.vk(), f.ns.vk(), "a/b/+", "P", 4);
        let chain = DChain::from_dots(true, vec![d1, d2]).unwrap();
        let want = AccessPermissions::parse("P").unwrap();
        let a = chain
            .valid_on(f.ns.vk(), "a/b/c", &want, f.publisher.vk())
            .unwrap();
        assert_eq!(a.uri, "a/b/c");
        assert_eq!(a.ttl, 4);
        assert_eq!(&a.receiver, f.publisher.vk());
    }

    #[test]
    fn test_overconstrained_link() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/+/c", "P", 5);
        let d2 = grant(&f.mid, f.publisher.vk(), f.ns.vk(), "a/b/d", "P", 4);
        let chain = DChain::from_dots(true, vec![d1, d2]).unwrap();
        let err = chain.analyze_access("a/b/c").unwrap_err();
        assert_eq!(err.code, StatusCode::OverconstrainedURI);
    }

    #[test]
    fn test_broken_link_and_ttl() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/*", "P", 0);
        let d2 = grant(&f.mid, f.publisher.vk(), f.ns.vk(), "a/*", "P", 4);
        let chain = DChain::from_dots(true, vec![d1, d2.clone()]).unwrap();
        assert_eq!(
            chain.analyze_access("a/x").unwrap_err().code,
            StatusCode::TTLExpired
        );

        let skip = grant(&f.ns, f.publisher.vk(), f.ns.vk(), "a/*", "P", 5);
        let chain = DChain::from_dots(true, vec![skip, d2]).unwrap();
        assert_eq!(
            chain.analyze_access("a/x").unwrap_err().code,
            StatusCode::BadLink
        );
    }

    #[test]
    fn test_chain_must_start_at_namespace() {
        let f = fixture();
        let d = grant(&f.mid, f.publisher.vk(), f.ns.vk(), "a/*", "P", 5);
        let chain = DChain::from_dots(true, vec![d]).unwrap();
        assert_eq!(
            chain.analyze_access("a/x").unwrap_err().code,
            StatusCode::ChainOriginNotMVK
        );
    }

    #[test]
    fn test_permissions_and_target() {
        let f = fixture();
        let d1 = grant(&f.ns, f.mid.vk(), f.ns.vk(), "a/*", "C", 5);
        let chain = DChain::from_dots(true, vec![d1]).unwrap();
        let publish = AccessPermissions::parse("P").unwrap();
        let consume = AccessPermissions::parse("C").unwrap();
        assert_eq!(
            chain
                .valid_on(f.ns.vk(), "a/x", &publish, f.mid.vk())
                .unwrap_err()
                .code,
            StatusCode::BadPermissions
        );
        assert_eq!(
            chain
                .valid_on(f.ns.vk(), "a/x", &consume, f.publisher.vk())
                .unwrap_err()
                .code,
            StatusCode::OriginVKMismatch
        );
        assert_eq!(
            chain
                .valid_on(f.mid.vk(), "a/x", &consume, f.mid.vk())
                .unwrap_err()
                .code,
            StatusCode::MVKMismatch
        );
    }

    #[test]
    fn test_everybody_receiver_accepts_any_target() {
        let f = fixture();
        let d1 = grant(&f.ns, &EVERYBODY_VK, f.ns.vk(), "a/*", "C", 5);
        let chain = DChain::from_dots(true, vec![d1]).unwrap();
        let consume = AccessPermissions::parse("C").unwrap();
        assert!(chain
            .valid_on(f.ns.vk(), "a/x", &consume, f.publisher.vk())
            .is_ok());
    }
}
