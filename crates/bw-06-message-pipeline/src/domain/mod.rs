//! # Domain Layer
//!
//! - `params` - inputs and outputs of client operations

pub mod params;

pub use params::{
    BcInteractionParams, BcipUpdate, BuildChainParams, CreateDotParams, CreateEntityParams,
    ElaboratePac, MessageRequest,
};
