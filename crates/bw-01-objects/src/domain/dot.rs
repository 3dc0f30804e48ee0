//! Delegations of trust.
//!
//! ```text
//! giver[32] | receiver[32] | ttl[1] | kind[1] | TLV* | 0x00 | variant | signature[64]
//! access variant:     permbits[2 LE] | nsvk[32] | suffix_len[2 LE] | suffix
//! permission variant: (key_len[1] | key | val_len[2 LE] | val)* | 0x00
//! ```
//!
//! The hash is SHA-256 over everything before the signature; the signature
//! is by the giver.

use super::codec::{Metadata, Reader};
use super::entity::SecretSeed;
use super::routing::ronum;
use shared_crypto::{sha256, sign_blob, verify_blob, vk_from_seed};
use shared_types::{
    analyze_suffix, AccessPermissions, BwError, BwResult, Hash32, SigBytes, StatusCode, Timestamp,
    Vk,
};
use std::collections::BTreeMap;

const KIND_ACCESS: u8 = 0x01;
const KIND_PERMISSION: u8 = 0x02;

/// What an access DOT grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Namespace the grant applies to.
    pub mvk: Vk,
    /// URI suffix pattern.
    pub suffix: String,
    pub permissions: AccessPermissions,
}

/// Variant-specific part of a DOT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotBody {
    Access(AccessGrant),
    /// Application-level key/value permissions, opaque to the router.
    Permission(BTreeMap<String, String>),
}

/// Fields common to both DOT kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotHeader {
    pub giver: Vk,
    pub receiver: Vk,
    pub ttl: u8,
    pub meta: Metadata,
}

/// A signed delegation of trust.
#[derive(Debug, Clone)]
pub struct Dot {
    header: DotHeader,
    body: DotBody,
    signature: SigBytes,
    hash: Hash32,
    content: Vec<u8>,
}

impl PartialEq for Dot {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl Eq for Dot {}

/// Parameters for [`Dot::sign`]. The giver is implied by the signing key.
#[derive(Debug, Clone)]
pub struct DotParams {
    pub receiver: Vk,
    pub ttl: u8,
    pub meta: Metadata,
    pub body: DotBody,
}

impl Dot {
    /// Encode and sign a new DOT with the giver's seed.
    pub fn sign(giver_sk: &SecretSeed, params: DotParams) -> BwResult<Self> {
        params.meta.check()?;
        let header = DotHeader {
            giver: vk_from_seed(giver_sk.as_bytes()),
            receiver: params.receiver,
            ttl: params.ttl,
            meta: params.meta,
        };
        let mut content = Vec::with_capacity(256);
        content.extend_from_slice(&header.giver);
        content.extend_from_slice(&header.receiver);
        content.push(header.ttl);
        match &params.body {
            DotBody::Access(grant) => {
                if analyze_suffix(&grant.suffix).is_none() {
                    return Err(BwError::new(
                        StatusCode::BadURI,
                        format!("invalid URI suffix {:?}", grant.suffix),
                    ));
                }
                if grant.suffix.len() > u16::MAX as usize {
                    return Err(BwError::new(StatusCode::BadURI, "URI suffix too long"));
                }
                content.push(KIND_ACCESS);
                header.meta.encode(&mut content);
                content.extend_from_slice(&grant.permissions.to_bits().to_le_bytes());
                content.extend_from_slice(&grant.mvk);
                content.extend_from_slice(&(grant.suffix.len() as u16).to_le_bytes());
                content.extend_from_slice(grant.suffix.as_bytes());
            }
            DotBody::Permission(kv) => {
                content.push(KIND_PERMISSION);
                header.meta.encode(&mut content);
                for (k, v) in kv {
                    if k.is_empty() || k.len() > u8::MAX as usize || v.len() > u16::MAX as usize {
                        return Err(BwError::new(
                            StatusCode::InvalidCoding,
                            format!("permission entry {k:?} does not fit"),
                        ));
                    }
                    content.push(k.len() as u8);
                    content.extend_from_slice(k.as_bytes());
                    content.extend_from_slice(&(v.len() as u16).to_le_bytes());
                    content.extend_from_slice(v.as_bytes());
                }
                content.push(0);
            }
        }
        let hash = sha256(&content);
        let signature = sign_blob(giver_sk.as_bytes(), &content);
        content.extend_from_slice(&signature);
        Ok(Self {
            header,
            body: params.body,
            signature,
            hash,
            content,
        })
    }

    /// Parse a DOT carried under routing object number `ro`.
    ///
    /// The kind byte must agree with the routing object number, otherwise
    /// an access DOT could be replayed as a permission DOT.
    pub fn decode(ro: u8, content: &[u8]) -> BwResult<Self> {
        let expect_kind = match ro {
            ronum::ACCESS_DOT => KIND_ACCESS,
            ronum::PERMISSION_DOT => KIND_PERMISSION,
            other => {
                return Err(BwError::new(
                    StatusCode::InvalidCoding,
                    format!("routing object 0x{other:02x} is not a DOT"),
                ))
            }
        };
        let mut r = Reader::new(content, "DOT");
        let giver = r.array32()?;
        let receiver = r.array32()?;
        let ttl = r.u8()?;
        let kind = r.u8()?;
        if kind != expect_kind {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "DOT kind does not match routing object number",
            ));
        }
        let meta = Metadata::decode(&mut r)?;
        let body = if kind == KIND_ACCESS {
            let permissions = AccessPermissions::from_bits(r.u16_le()?);
            let mvk = r.array32()?;
            let suffix_len = r.u16_le()? as usize;
            let suffix = r.utf8(suffix_len)?;
            DotBody::Access(AccessGrant {
                mvk,
                suffix,
                permissions,
            })
        } else {
            let mut kv = BTreeMap::new();
            loop {
                let klen = r.u8()? as usize;
                if klen == 0 {
                    break;
                }
                let key = r.utf8(klen)?;
                let vlen = r.u16_le()? as usize;
                let value = r.utf8(vlen)?;
                kv.insert(key, value);
            }
            DotBody::Permission(kv)
        };
        let cover = r.position();
        let signature = r.array64()?;
        if r.remaining() != 0 {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "trailing bytes after DOT signature",
            ));
        }
        Ok(Self {
            header: DotHeader {
                giver,
                receiver,
                ttl,
                meta,
            },
            body,
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

    pub fn header(&self) -> &DotHeader {
        &self.header
    }

    pub fn body(&self) -> &DotBody {
        &self.body
    }

    pub fn giver(&self) -> &Vk {
        &self.header.giver
    }

    pub fn receiver(&self) -> &Vk {
        &self.header.receiver
    }

    pub fn ttl(&self) -> u8 {
        self.header.ttl
    }

    pub fn expiry(&self) -> Option<&Timestamp> {
        self.header.meta.expiry.as_ref()
    }

    pub fn revokers(&self) -> &[Vk] {
        &self.header.meta.revokers
    }

    pub fn signature(&self) -> &SigBytes {
        &self.signature
    }

    pub fn is_access(&self) -> bool {
        matches!(self.body, DotBody::Access(_))
    }

    /// The access grant, for access DOTs.
    pub fn access(&self) -> Option<&AccessGrant> {
        match &self.body {
            DotBody::Access(grant) => Some(grant),
            DotBody::Permission(_) => None,
        }
    }

    /// Routing object number this DOT travels under.
    pub fn ro_num(&self) -> u8 {
        if self.is_access() {
            ronum::ACCESS_DOT
        } else {
            ronum::PERMISSION_DOT
        }
    }

    /// Signature check plus, for access DOTs, URI syntax.
    pub fn sig_valid(&self) -> bool {
        if let Some(grant) = self.access() {
            if analyze_suffix(&grant.suffix).is_none() {
                return false;
            }
        }
        let cover = self.content.len() - 64;
        verify_blob(&self.header.giver, &self.signature, &self.content[..cover])
    }

    pub fn is_expired(&self, now: &Timestamp) -> bool {
        self.header.meta.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Entity;
    use shared_types::now_millis;

    fn access_params(receiver: Vk, mvk: Vk, suffix: &str, perms: &str) -> DotParams {
        DotParams {
            receiver,
            ttl: 5,
            meta: Metadata {
                created: Some(now_millis()),
                ..Metadata::default()
            },
            body: DotBody::Access(AccessGrant {
                mvk,
                suffix: suffix.into(),
                permissions: AccessPermissions::parse(perms).unwrap(),
            }),
        }
    }

    #[test]
    fn test_access_dot_round_trip() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let receiver = Entity::create(Metadata::default()).unwrap();
        let dot = Dot::sign(
            giver.sk().unwrap(),
            access_params(*receiver.vk(), *giver.vk(), "a/+/c", "C*P"),
        )
        .unwrap();
        assert!(dot.sig_valid());
        assert_eq!(dot.giver(), giver.vk());
        let cover = dot.content().len() - 64;
        assert_eq!(dot.hash(), &sha256(&dot.content()[..cover]));

        let decoded = Dot::decode(ronum::ACCESS_DOT, dot.content()).unwrap();
        assert_eq!(decoded, dot);
        assert_eq!(decoded.hash(), dot.hash());
        assert_eq!(decoded.access().unwrap().suffix, "a/+/c");
        assert_eq!(decoded.access().unwrap().permissions.to_perm_string(), "C*P");
    }

    #[test]
    fn test_permission_dot_round_trip() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let mut kv = BTreeMap::new();
        kv.insert("role".to_string(), "admin".to_string());
        kv.insert("building".to_string(), "soda".to_string());
        let dot = Dot::sign(
            giver.sk().unwrap(),
            DotParams {
                receiver: [2u8; 32],
                ttl: 0,
                meta: Metadata::default(),
                body: DotBody::Permission(kv.clone()),
            },
        )
        .unwrap();
        let decoded = Dot::decode(ronum::PERMISSION_DOT, dot.content()).unwrap();
        assert_eq!(decoded.body(), &DotBody::Permission(kv));
        assert!(decoded.sig_valid());
    }

    #[test]
    fn test_kind_must_match_ro_number() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let dot = Dot::sign(
            giver.sk().unwrap(),
            access_params([1u8; 32], *giver.vk(), "a/b", "P"),
        )
        .unwrap();
        assert!(Dot::decode(ronum::PERMISSION_DOT, dot.content()).is_err());
    }

    #[test]
    fn test_bit_flip_breaks_signature() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let dot = Dot::sign(
            giver.sk().unwrap(),
            access_params([1u8; 32], *giver.vk(), "a/b", "P"),
        )
        .unwrap();
        let mut bytes = dot.content().to_vec();
        // flip a bit in the receiver key
        bytes[40] ^= 0x01;
        let tampered = Dot::decode(ronum::ACCESS_DOT, &bytes).unwrap();
        assert!(!tampered.sig_valid());
        assert_ne!(tampered.hash(), dot.hash());
    }

    #[test]
    fn test_bad_suffix_rejected() {
        let giver = Entity::create(Metadata::default()).unwrap();
        let err = Dot::sign(
            giver.sk().unwrap(),
            access_params([1u8; 32], *giver.vk(), "a//b", "P"),
        )
        .unwrap_err();
        assert_eq!(err.code, StatusCode::BadURI);
    }
}
