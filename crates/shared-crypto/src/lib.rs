//! # Shared Crypto - Signing and Hashing Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Entity, DOT, revocation and message signatures |
//! | `hashing` | SHA-256 | DOT, chain and revocation hashes |
//! | `encoding` | base64url | Text form of keys and hashes in commands |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency when signing
//! - Secret seeds are zeroized when a key pair is dropped

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use encoding::{decode_b64, encode_b64, fmt_hash, fmt_key, fmt_sig, unfmt_hash, unfmt_key};
pub use errors::CryptoError;
pub use hashing::{sha256, sha256_many, Hash};
pub use signatures::{
    sign_blob, verify_blob, vk_from_seed, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
