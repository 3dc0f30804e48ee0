//! Parameters of client operations.

use bw_01_objects::{DChain, PayloadObject, RoutingObject};
use shared_types::{BwError, StatusCode, Timestamp, Vk};
use std::str::FromStr;
use std::time::Duration;

/// How much of the primary access chain travels with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElaboratePac {
    /// Chain hash only.
    #[default]
    None,
    /// The elaborated chain.
    Partial,
    /// The elaborated chain and every DOT in it.
    Full,
}

impl FromStr for ElaboratePac {
    type Err = BwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "partial" => Ok(Self::Partial),
            "full" => Ok(Self::Full),
            other => Err(BwError::new(
                StatusCode::MalformedOOBCommand,
                format!("bad PAC elaboration {other:?}"),
            )),
        }
    }
}

/// Everything a publish, subscribe, query or list needs besides its type.
#[derive(Debug, Clone, Default)]
pub struct MessageRequest {
    pub mvk: Vk,
    pub suffix: String,
    pub primary_access_chain: Option<DChain>,
    /// Build a chain for the active entity instead of naming one.
    pub autochain: bool,
    pub elaborate_pac: ElaboratePac,
    pub routing_objects: Vec<RoutingObject>,
    pub payload_objects: Vec<PayloadObject>,
    pub expiry: Option<Timestamp>,
    pub expiry_delta: Option<Duration>,
    /// Publish and persist only; zero means every subscriber.
    pub consumers: u8,
}

impl MessageRequest {
    pub fn new(mvk: Vk, suffix: impl Into<String>) -> Self {
        Self {
            mvk,
            suffix: suffix.into(),
            ..Self::default()
        }
    }

    pub fn with_chain(mut self, chain: DChain) -> Self {
        self.primary_access_chain = Some(chain);
        self
    }

    pub fn with_autochain(mut self) -> Self {
        self.autochain = true;
        self
    }

    pub fn with_payload(mut self, po: PayloadObject) -> Self {
        self.payload_objects.push(po);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateEntityParams {
    pub expiry: Option<Timestamp>,
    pub expiry_delta: Option<Duration>,
    pub contact: String,
    pub comment: String,
    pub revokers: Vec<Vk>,
    pub omit_creation_date: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateDotParams {
    pub is_permission: bool,
    pub to: Vk,
    pub ttl: u8,
    pub expiry: Option<Timestamp>,
    pub expiry_delta: Option<Duration>,
    pub contact: String,
    pub comment: String,
    pub revokers: Vec<Vk>,
    pub omit_creation_date: bool,
    pub mvk: Vk,
    pub suffix: String,
    pub access_permissions: String,
}

#[derive(Debug, Clone)]
pub struct BuildChainParams {
    /// `namespace/suffix`; the namespace may be a key or an alias.
    pub uri: String,
    pub permissions: String,
    pub to: Vk,
}

/// Registry interaction settings as reported by `bcip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcInteractionParams {
    pub confirmations: u64,
    pub timeout_blocks: u64,
    pub max_chain_age: Duration,
    pub current_block: u64,
    pub head_block_age: Duration,
}

/// Fields of `bcip` the client wants changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcipUpdate {
    pub confirmations: Option<u64>,
    pub timeout_blocks: Option<u64>,
    pub max_chain_age: Option<Duration>,
}
