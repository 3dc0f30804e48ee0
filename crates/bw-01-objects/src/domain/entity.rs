//! Entities: a verifying key with signed metadata, optionally holding the
//! signing key.
//!
//! Layout: `vk[32] | TLV* | 0x00 | signature[64]`. The keyed form used by
//! `EntityWithKey` is `sk[32] ++ layout`.

use super::codec::{Metadata, Reader};
use shared_crypto::{sign_blob, verify_blob, vk_from_seed, Ed25519KeyPair};
use shared_types::{BwError, BwResult, SigBytes, StatusCode, Timestamp, Vk};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ed25519 secret seed, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretSeed([u8; 32]);

impl SecretSeed {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSeed(..)")
    }
}

/// A signed principal.
#[derive(Debug, Clone)]
pub struct Entity {
    vk: Vk,
    sk: Option<SecretSeed>,
    meta: Metadata,
    signature: SigBytes,
    content: Vec<u8>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl Eq for Entity {}

impl Entity {
    /// Generate a fresh key pair and sign the metadata with it.
    pub fn create(meta: Metadata) -> BwResult<Self> {
        let keypair = Ed25519KeyPair::generate();
        Self::from_seed(SecretSeed::new(keypair.to_seed()), meta)
    }

    /// Sign the metadata with an existing seed.
    pub fn from_seed(sk: SecretSeed, meta: Metadata) -> BwResult<Self> {
        meta.check()?;
        let vk = vk_from_seed(sk.as_bytes());
        let mut content = Vec::with_capacity(128);
        content.extend_from_slice(&vk);
        meta.encode(&mut content);
        let signature = sign_blob(sk.as_bytes(), &content);
        content.extend_from_slice(&signature);
        Ok(Self {
            vk,
            sk: Some(sk),
            meta,
            signature,
            content,
        })
    }

    /// Parse the public form.
    pub fn decode(content: &[u8]) -> BwResult<Self> {
        let mut r = Reader::new(content, "entity");
        let vk = r.array32()?;
        let meta = Metadata::decode(&mut r)?;
        let signature = r.array64()?;
        if r.remaining() != 0 {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "trailing bytes after entity signature",
            ));
        }
        Ok(Self {
            vk,
            sk: None,
            meta,
            signature,
            content: content.to_vec(),
        })
    }

    /// Parse the keyed form `sk ++ entity`. The seed must match the key.
    pub fn decode_with_key(blob: &[u8]) -> BwResult<Self> {
        if blob.len() < 32 {
            return Err(BwError::new(StatusCode::InvalidCoding, "truncated keyed entity"));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&blob[..32]);
        let sk = SecretSeed::new(seed);
        seed.zeroize();
        let mut entity = Self::decode(&blob[32..])?;
        if vk_from_seed(sk.as_bytes()) != entity.vk {
            return Err(BwError::new(
                StatusCode::InvalidEntity,
                "signing key does not match verifying key",
            ));
        }
        entity.sk = Some(sk);
        Ok(entity)
    }

    /// Signed public bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// `sk ++ content`, if the signing key is held.
    pub fn signing_blob(&self) -> Option<Vec<u8>> {
        self.sk.as_ref().map(|sk| {
            let mut blob = Vec::with_capacity(32 + self.content.len());
            blob.extend_from_slice(sk.as_bytes());
            blob.extend_from_slice(&self.content);
            blob
        })
    }

    pub fn vk(&self) -> &Vk {
        &self.vk
    }

    pub fn sk(&self) -> Option<&SecretSeed> {
        self.sk.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn created(&self) -> Option<&Timestamp> {
        self.meta.created.as_ref()
    }

    pub fn expiry(&self) -> Option<&Timestamp> {
        self.meta.expiry.as_ref()
    }

    pub fn revokers(&self) -> &[Vk] {
        &self.meta.revokers
    }

    pub fn signature(&self) -> &SigBytes {
        &self.signature
    }

    /// Does the self-signature verify?
    pub fn sig_valid(&self) -> bool {
        let cover = self.content.len() - 64;
        verify_blob(&self.vk, &self.signature, &self.content[..cover])
    }

    pub fn is_expired(&self, now: &Timestamp) -> bool {
        self.meta.is_expired(now)
    }

    /// Sign an arbitrary blob as this entity.
    pub fn sign(&self, blob: &[u8]) -> BwResult<SigBytes> {
        let sk = self
            .sk
            .as_ref()
            .ok_or_else(|| BwError::new(StatusCode::NoEntity, "entity has no signing key"))?;
        Ok(sign_blob(sk.as_bytes(), blob))
    }
}
