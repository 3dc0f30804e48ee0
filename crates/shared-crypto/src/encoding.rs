//! Text forms of keys, hashes and signatures.
//!
//! All three use padded base64url, so a 32-byte key is always 44 chars.

use crate::CryptoError;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

/// Format a verifying key.
pub fn fmt_key(vk: &[u8; 32]) -> String {
    URL_SAFE.encode(vk)
}

/// Format a hash.
pub fn fmt_hash(hash: &[u8; 32]) -> String {
    URL_SAFE.encode(hash)
}

/// Format a signature.
pub fn fmt_sig(sig: &[u8; 64]) -> String {
    URL_SAFE.encode(sig)
}

/// Parse a 44-char key.
pub fn unfmt_key(s: &str) -> Result<[u8; 32], CryptoError> {
    unfmt32(s)
}

/// Parse a 44-char hash.
pub fn unfmt_hash(s: &str) -> Result<[u8; 32], CryptoError> {
    unfmt32(s)
}

fn unfmt32(s: &str) -> Result<[u8; 32], CryptoError> {
    if s.len() != 44 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 44,
            actual: s.len(),
        });
    }
    let bytes = URL_SAFE
        .decode(s)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual,
        })
}

/// Generic base64url encode for opaque blobs.
pub fn encode_b64(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Generic base64url decode for opaque blobs.
pub fn decode_b64(s: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE
        .decode(s)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let vk = [0x5au8; 32];
        let s = fmt_key(&vk);
        assert_eq!(s.len(), 44);
        assert_eq!(unfmt_key(&s).unwrap(), vk);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(unfmt_key("abc").is_err());
        assert!(unfmt_hash(&"A".repeat(44)).is_err());
    }
}
