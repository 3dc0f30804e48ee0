//! Revocations of DOTs and entities.
//!
//! Layout: `vk[32] | target[32] | TLV* | 0x00 | signature[64]`, where the
//! target is a DOT hash or an entity VK. Only the creation time and comment
//! TLVs are meaningful here.

use super::codec::{Metadata, Reader};
use super::dot::Dot;
use super::entity::{Entity, SecretSeed};
use shared_crypto::{sha256, sign_blob, verify_blob, vk_from_seed};
use shared_types::{BwError, BwResult, Hash32, SigBytes, StatusCode, Timestamp, Vk};

#[derive(Debug, Clone)]
pub struct Revocation {
    vk: Vk,
    target: [u8; 32],
    created: Option<Timestamp>,
    comment: String,
    signature: SigBytes,
    hash: Hash32,
    content: Vec<u8>,
}

impl PartialEq for Revocation {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl Eq for Revocation {}

impl Revocation {
    /// Sign a revocation of `target` with the revoker's seed.
    pub fn sign(
        sk: &SecretSeed,
        target: [u8; 32],
        created: Option<Timestamp>,
        comment: &str,
    ) -> BwResult<Self> {
        let meta = Metadata {
            created,
            comment: comment.to_string(),
            ..Metadata::default()
        };
        meta.check()?;
        let vk = vk_from_seed(sk.as_bytes());
        let mut content = Vec::with_capacity(160 + comment.len());
        content.extend_from_slice(&vk);
        content.extend_from_slice(&target);
        meta.encode(&mut content);
        let hash = sha256(&content);
        let signature = sign_blob(sk.as_bytes(), &content);
        content.extend_from_slice(&signature);
        Ok(Self {
            vk,
            target,
            created: meta.created,
            comment: meta.comment,
            signature,
            hash,
            content,
        })
    }

    pub fn decode(content: &[u8]) -> BwResult<Self> {
        let mut r = Reader::new(content, "revocation");
        let vk = r.array32()?;
        let target = r.array32()?;
        let meta = Metadata::decode(&mut r)?;
        let cover = r.position();
        let signature = r.array64()?;
        if r.remaining() != 0 {
            return Err(BwError::new(
                StatusCode::InvalidRevocation,
                "trailing bytes after revocation signature",
            ));
        }
        Ok(Self {
            vk,
            target,
            created: meta.created,
            comment: meta.comment,
            signature,
            hash: sha256(&content[..cover]),
            content: content.to_vec(),
        })
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn hash(&self) -> &Hash32 {
        &self.hash
    }

    /// The revoking key.
    pub fn vk(&self) -> &Vk {
        &self.vk
    }

    /// DOT hash or entity VK being revoked.
    pub fn target(&self) -> &[u8; 32] {
        &self.target
    }

    pub fn created(&self) -> Option<&Timestamp> {
        self.created.as_ref()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn sig_valid(&self) -> bool {
        let cover = self.content.len() - 64;
        verify_blob(&self.vk, &self.signature, &self.content[..cover])
    }

    /// Valid against a DOT when signed by its giver or one of its revokers.
    pub fn is_valid_for_dot(&self, dot: &Dot) -> bool {
        self.sig_valid()
            && &self.target == dot.hash()
            && (&self.vk == dot.giver() || dot.revokers().contains(&self.vk))
    }

    /// Valid against an entity when signed by the entity itself or one of
    /// its revokers.
    pub fn is_valid_for_entity(&self, entity: &Entity) -> bool {
        self.sig_valid()
            && &self.target == entity.vk()
            && (&self.vk == entity.vk() || entity.revokers().contains(&self.vk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codec::Metadata;
    use crate::domain::dot::{AccessGrant, DotBody, DotParams};
    use shared_types::{now_millis, AccessPermissions};

    fn dot_from(giver: &Entity, revokers: Vec<Vk>) -> Dot {
        Dot::sign(
            giver.sk().unwrap(),
            DotParams {
                receiver: [1u8; 32],
                ttl: 3,
                meta: Metadata {
                    revokers,
                    ..Metadata::default()
                },
                body: DotBody::Access(AccessGrant {
                    mvk: *giver.vk(),
                    suffix: "x/y".into(),
                    permissions: AccessPermissions::parse("P").unwrap(),
                }),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let e = Entity::create(Metadata::default()).unwrap();
        let r = Revocation::sign(e.sk().unwrap(), *e.vk(), Some(now_millis()), "lost key").unwrap();
        let d = Revocation::decode(r.content()).unwrap();
        assert_eq!(d, r);
        assert_eq!(d.hash(), r.hash());
        assert_eq!(d.comment(), "lost key");
        assert!(d.sig_valid());
    }

    #[test]
    fn test_giver_can_revoke_dot() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let dot = dot_from(&giver, vec![]);
        let r = Revocation::sign(giver.sk().unwrap(), *dot.hash(), None, "").unwrap();
        assert!(r.is_valid_for_dot(&dot));
    }

    #[test]
    fn test_delegated_revoker() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let revoker = Entity::create(Metadata::default()).unwrap();
        let stranger = Entity::create(Metadata::default()).unwrap();
        let dot = dot_from(&giver, vec![*revoker.vk()]);

        let ok = Revocation::sign(revoker.sk().unwrap(), *dot.hash(), None, "").unwrap();
        assert!(ok.is_valid_for_dot(&dot));
        let bad = Revocation::sign(stranger.sk().unwrap(), *dot.hash(), None, "").unwrap();
        assert!(!bad.is_valid_for_dot(&dot));
    }

    #[test]
    fn test_entity_self_revocation() {
        let e = Entity::create(Metadata::default()).unwrap();
        let other = Entity::create(Metadata::default()).unwrap();
        let r = Revocation::sign(e.sk().unwrap(), *e.vk(), None, "").unwrap();
        assert!(r.is_valid_for_entity(&e));
        assert!(!r.is_valid_for_entity(&other));
    }
}
