//! Routing objects: the typed blocks a message carries to justify itself.

use super::dchain::DChain;
use super::dot::Dot;
use super::entity::Entity;
use super::revocation::Revocation;
use shared_types::{from_millis, to_millis, BwError, BwResult, StatusCode, Timestamp, Vk};
use std::sync::Arc;

/// Routing object numbers.
pub mod ronum {
    pub const ACCESS_CHAIN_HASH: u8 = 0x01;
    pub const ACCESS_CHAIN: u8 = 0x02;
    pub const PERMISSION_CHAIN_HASH: u8 = 0x11;
    pub const PERMISSION_CHAIN: u8 = 0x12;
    pub const ACCESS_DOT: u8 = 0x20;
    pub const PERMISSION_DOT: u8 = 0x21;
    pub const ENTITY: u8 = 0x30;
    pub const ENTITY_WITH_KEY: u8 = 0x31;
    pub const ORIGIN_VK: u8 = 0x32;
    pub const EXPIRY: u8 = 0x40;
    pub const REVOCATION: u8 = 0x50;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingObject {
    Dot(Arc<Dot>),
    Chain(DChain),
    Entity(Arc<Entity>),
    /// Entity carrying its signing key.
    EntityWithKey(Arc<Entity>),
    OriginVk(Vk),
    Expiry(Timestamp),
    Revocation(Arc<Revocation>),
}

impl RoutingObject {
    /// Decode the content of a block with routing object number `ro`.
    pub fn decode(ro: u8, content: &[u8]) -> BwResult<Self> {
        match ro {
            ronum::ACCESS_DOT | ronum::PERMISSION_DOT => {
                Ok(Self::Dot(Arc::new(Dot::decode(ro, content)?)))
            }
            ronum::ACCESS_CHAIN
            | ronum::ACCESS_CHAIN_HASH
            | ronum::PERMISSION_CHAIN
            | ronum::PERMISSION_CHAIN_HASH => Ok(Self::Chain(DChain::decode(ro, content)?)),
            ronum::ENTITY => Ok(Self::Entity(Arc::new(Entity::decode(content)?))),
            ronum::ENTITY_WITH_KEY => Ok(Self::EntityWithKey(Arc::new(
                Entity::decode_with_key(content)?,
            ))),
            ronum::ORIGIN_VK => {
                let vk: Vk = content.try_into().map_err(|_| {
                    BwError::new(StatusCode::InvalidCoding, "origin VK must be 32 bytes")
                })?;
                Ok(Self::OriginVk(vk))
            }
            ronum::EXPIRY => {
                let raw: [u8; 8] = content.try_into().map_err(|_| {
                    BwError::new(StatusCode::InvalidCoding, "expiry must be 8 bytes")
                })?;
                Ok(Self::Expiry(from_millis(u64::from_le_bytes(raw) as i64)))
            }
            ronum::REVOCATION => Ok(Self::Revocation(Arc::new(Revocation::decode(content)?))),
            other => Err(BwError::new(
                StatusCode::InvalidCoding,
                format!("unknown routing object 0x{other:02x}"),
            )),
        }
    }

    pub fn ro_num(&self) -> u8 {
        match self {
            Self::Dot(d) => d.ro_num(),
            Self::Chain(c) => c.ro_num(),
            Self::Entity(_) => ronum::ENTITY,
            Self::EntityWithKey(_) => ronum::ENTITY_WITH_KEY,
            Self::OriginVk(_) => ronum::ORIGIN_VK,
            Self::Expiry(_) => ronum::EXPIRY,
            Self::Revocation(_) => ronum::REVOCATION,
        }
    }

    /// Wire bytes of the object. An `EntityWithKey` without its key falls
    /// back to the public form.
    pub fn content(&self) -> Vec<u8> {
        match self {
            Self::Dot(d) => d.content().to_vec(),
            Self::Chain(c) => c.content(),
            Self::Entity(e) => e.content().to_vec(),
            Self::EntityWithKey(e) => e.signing_blob().unwrap_or_else(|| e.content().to_vec()),
            Self::OriginVk(vk) => vk.to_vec(),
            Self::Expiry(t) => (to_millis(t) as u64).to_le_bytes().to_vec(),
            Self::Revocation(r) => r.content().to_vec(),
        }
    }

    /// Access chain, elaborated or not.
    pub fn as_access_chain(&self) -> Option<&DChain> {
        match self {
            Self::Chain(c) if c.is_access() => Some(c),
            _ => None,
        }
    }

    pub fn as_access_dot(&self) -> Option<&Arc<Dot>> {
        match self {
            Self::Dot(d) if d.is_access() => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::now_millis;

    #[test]
    fn test_origin_and_expiry() {
        let ro = RoutingObject::OriginVk([4u8; 32]);
        let back = RoutingObject::decode(ro.ro_num(), &ro.content()).unwrap();
        assert_eq!(back, ro);

        let now = now_millis();
        let ro = RoutingObject::Expiry(now);
        assert_eq!(ro.content().len(), 8);
        let back = RoutingObject::decode(ronum::EXPIRY, &ro.content()).unwrap();
        assert_eq!(back, RoutingObject::Expiry(now));
    }

    #[test]
    fn test_unknown_and_short_objects_fail() {
        assert!(RoutingObject::decode(0x7e, &[]).is_err());
        assert!(RoutingObject::decode(ronum::ORIGIN_VK, &[1, 2, 3]).is_err());
        assert!(RoutingObject::decode(ronum::ACCESS_CHAIN, &[0u8; 33]).is_err());
    }
}
