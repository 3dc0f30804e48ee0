//! # Outbound Ports (Driven Ports)
//!
//! The registry: an append-only authority for entities, DOTs, chains,
//! revocations and aliases, with a monotonically advancing block height.
//!
//! Resolution methods report the object together with its state and do
//! not fail just because the object is revoked or expired. Publishing
//! methods return once the transaction is confirmed.

use crate::domain::events::{BlockEvent, RouterOffer, TransactionParams};
use async_trait::async_trait;
use bw_01_objects::{DChain, Dot, Entity, Revocation};
use shared_types::{BwResult, Hash32, ValidityState, Vk};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[async_trait]
pub trait RegistryProvider: Send + Sync {
    // =========================================================================
    // Resolution
    // =========================================================================

    async fn resolve_entity(&self, vk: &Vk) -> BwResult<(Option<Arc<Entity>>, ValidityState)>;

    async fn resolve_dot(&self, hash: &Hash32) -> BwResult<(Option<Arc<Dot>>, ValidityState)>;

    /// Elaborated access chain by chain hash. DOTs are not attached.
    async fn resolve_access_chain(
        &self,
        hash: &Hash32,
    ) -> BwResult<(Option<DChain>, ValidityState)>;

    /// Every DOT hash `vk` has ever granted.
    async fn resolve_dots_from_vk(&self, vk: &Vk) -> BwResult<Vec<Hash32>>;

    // =========================================================================
    // Blocks and events
    // =========================================================================

    fn current_block(&self) -> u64;

    /// Wall time since the head block was produced.
    fn head_block_age(&self) -> Duration;

    /// Events recorded in blocks `from + 1 ..= to`.
    async fn events_between(&self, from: u64, to: u64) -> BwResult<Vec<BlockEvent>>;

    /// Heights of newly produced blocks.
    fn subscribe_blocks(&self) -> broadcast::Receiver<u64>;

    fn transaction_params(&self) -> TransactionParams;

    fn set_transaction_params(&self, params: TransactionParams) -> BwResult<()>;

    // =========================================================================
    // Publishing
    // =========================================================================

    async fn publish_entity(&self, entity: &Entity) -> BwResult<()>;

    async fn publish_dot(&self, dot: &Dot) -> BwResult<()>;

    async fn publish_chain(&self, chain: &DChain) -> BwResult<()>;

    async fn publish_revocation(&self, revocation: &Revocation) -> BwResult<()>;

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Create a registry-numbered alias for `value`.
    async fn create_short_alias(&self, value: [u8; 32]) -> BwResult<u64>;

    async fn create_long_alias(&self, key: [u8; 32], value: [u8; 32]) -> BwResult<()>;

    async fn resolve_alias(&self, key: &[u8; 32]) -> BwResult<Option<[u8; 32]>>;

    async fn resolve_short_alias(&self, alias: u64) -> BwResult<Option<[u8; 32]>>;

    // =========================================================================
    // Accounts
    // =========================================================================

    async fn transfer(&self, from: &Vk, to: &Vk, amount: u128) -> BwResult<()>;

    async fn balance(&self, account: &Vk) -> BwResult<u128>;

    // =========================================================================
    // Designated routers
    // =========================================================================

    /// `dr` offers to route namespace `nsvk`.
    async fn new_router_offer(&self, dr: &Entity, nsvk: &Vk) -> BwResult<()>;

    /// Namespace `ns` accepts the offer made by `drvk`.
    async fn accept_router_offer(&self, ns: &Entity, drvk: &Vk) -> BwResult<()>;

    async fn retract_router_offer(&self, dr: &Entity, nsvk: &Vk) -> BwResult<()>;

    async fn retract_router_acceptance(&self, ns: &Entity, drvk: &Vk) -> BwResult<()>;

    /// Offers made on `nsvk`.
    async fn list_router_offers(&self, nsvk: &Vk) -> BwResult<Vec<RouterOffer>>;

    async fn update_srv_record(&self, dr: &Entity, record: &str) -> BwResult<()>;

    async fn srv_record(&self, drvk: &Vk) -> BwResult<Option<String>>;
}
