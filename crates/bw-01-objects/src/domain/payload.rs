//! Payload objects: opaque blobs keyed by a 32-bit PONum.

use shared_types::ponum::{
    PO_ACCESS_CHAIN, PO_ACCESS_CHAIN_HASH, PO_ACCESS_DOT, PO_ENTITY_WITH_KEY, PO_MESSAGE,
    PO_PERMISSION_CHAIN, PO_PERMISSION_CHAIN_HASH, PO_PERMISSION_DOT, PO_REVOCATION,
};
use shared_types::{ponum_to_dot_form, PoMask};

/// Payload families the router knows by number. The router never looks
/// inside payloads; this only names them for logs and command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// An encoded message (`1.0.1.1`).
    Message,
    /// An entity with its signing key (`1.0.1.2`).
    EntityWithKey,
    AccessDot,
    PermissionDot,
    AccessChainHash,
    AccessChain,
    PermissionChainHash,
    PermissionChain,
    Revocation,
    /// `2.0.3.1`
    Metadata,
    /// `67.0.0.0/8`
    Yaml,
    /// `2.0.0.0/8`
    MsgPack,
    /// `64.0.0.0/4`
    Text,
    Opaque(u32),
}

// Most specific first.
const FAMILIES: [(u32, u8, PayloadKind); 4] = [
    (0x0200_0301, 32, PayloadKind::Metadata),
    (0x4300_0000, 8, PayloadKind::Yaml),
    (0x0200_0000, 8, PayloadKind::MsgPack),
    (0x4000_0000, 4, PayloadKind::Text),
];

impl PayloadKind {
    pub fn of(ponum: u32) -> Self {
        match ponum {
            PO_MESSAGE => Self::Message,
            PO_ENTITY_WITH_KEY => Self::EntityWithKey,
            PO_ACCESS_DOT => Self::AccessDot,
            PO_PERMISSION_DOT => Self::PermissionDot,
            PO_ACCESS_CHAIN_HASH => Self::AccessChainHash,
            PO_ACCESS_CHAIN => Self::AccessChain,
            PO_PERMISSION_CHAIN_HASH => Self::PermissionChainHash,
            PO_PERMISSION_CHAIN => Self::PermissionChain,
            PO_REVOCATION => Self::Revocation,
            other => FAMILIES
                .iter()
                .find(|(num, bits, _)| PoMask { ponum: *num, bits: *bits }.matches(other))
                .map(|(_, _, kind)| *kind)
                .unwrap_or(Self::Opaque(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadObject {
    pub ponum: u32,
    pub content: Vec<u8>,
}

impl PayloadObject {
    pub fn new(ponum: u32, content: impl Into<Vec<u8>>) -> Self {
        Self {
            ponum,
            content: content.into(),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        PayloadKind::of(self.ponum)
    }

    pub fn dot_form(&self) -> String {
        ponum_to_dot_form(self.ponum)
    }

    /// UTF-8 view for text payloads.
    pub fn text(&self) -> Option<&str> {
        match self.kind() {
            PayloadKind::Text | PayloadKind::Yaml => std::str::from_utf8(&self.content).ok(),
            _ => None,
        }
    }
}
