//! # Routing Objects (bw-01)
//!
//! Byte-exact encodings of entities, DOTs, chains, revocations and
//! messages. Every object keeps the bytes it was decoded from (or encoded
//! to), so re-encoding is always byte-identical and hashes never drift.
//!
//! ## Object Layouts
//!
//! | Object | Pre-signature bytes | Signed by |
//! |--------|---------------------|-----------|
//! | Entity | `vk \| TLV* \| 0` | the entity |
//! | DOT | `giver \| receiver \| ttl \| kind \| TLV* \| 0 \| variant` | giver |
//! | Revocation | `vk \| target \| TLV* \| 0` | revoker |
//! | Message | header, RO block, PO block | origin |
//!
//! DChains are unsigned: an elaborated chain is its concatenated DOT hashes,
//! the unelaborated form is the SHA-256 of that.
//!
//! ## Routing Object Numbers
//!
//! | RO | Object |
//! |----|--------|
//! | `0x01` / `0x02` | access chain hash / access chain |
//! | `0x11` / `0x12` | permission chain hash / permission chain |
//! | `0x20` / `0x21` | access DOT / permission DOT |
//! | `0x30` / `0x31` | entity / entity with signing key |
//! | `0x32` | origin VK |
//! | `0x40` | message expiry |
//! | `0x50` | revocation |
//!
//! ## Crate Structure
//!
//! - `domain/` - pure encode/decode and chain analysis, no I/O

pub mod domain;

pub use domain::codec::{Metadata, MAX_TEXT_LEN};
pub use domain::dchain::{chain_hash_of, ChainAnalysis, DChain};
pub use domain::dot::{AccessGrant, Dot, DotBody, DotHeader, DotParams};
pub use domain::entity::{Entity, SecretSeed};
pub use domain::message::{Message, MessageParams, MessageType, UniqueMessageId};
pub use domain::payload::{PayloadKind, PayloadObject};
pub use domain::revocation::Revocation;
pub use domain::routing::{ronum, RoutingObject};
