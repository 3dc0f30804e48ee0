//! Registry events and transaction parameters.

use shared_types::{Hash32, Vk};

/// Something the registry recorded in a block. The invalidation task
/// turns these into cache flushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    NewDot {
        hash: Hash32,
        giver: Vk,
        receiver: Vk,
        /// Namespace of an access DOT.
        nsvk: Option<Vk>,
    },
    NewDotRevocation { hash: Hash32 },
    NewEntity { vk: Vk },
    NewEntityRevocation { vk: Vk },
}

/// Event tagged with the block that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub block: u64,
    pub event: RegistryEvent,
}

/// How long publishing waits for a transaction to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionParams {
    /// Blocks that must follow the including block.
    pub confirmations: u64,
    /// Blocks after submission before giving up.
    pub timeout_blocks: u64,
}

impl Default for TransactionParams {
    fn default() -> Self {
        Self {
            confirmations: 2,
            timeout_blocks: 20,
        }
    }
}

/// A designated-router offer on a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOffer {
    pub drvk: Vk,
    pub nsvk: Vk,
    /// The namespace has accepted the offer.
    pub accepted: bool,
}
