//! Alias keys.
//!
//! Long aliases key the registry by up to 32 raw bytes, right-padded with
//! zeroes. Short aliases are registry-assigned numbers stored under the
//! big-endian form of the number.

use shared_types::{BwError, BwResult, StatusCode};

/// Registry key of the long alias `name`.
pub fn long_alias_key(name: &[u8]) -> BwResult<[u8; 32]> {
    if name.is_empty() || name.len() > 32 {
        return Err(BwError::new(
            StatusCode::AliasError,
            format!("long alias must be 1 to 32 bytes, got {}", name.len()),
        ));
    }
    let mut key = [0u8; 32];
    key[..name.len()].copy_from_slice(name);
    Ok(key)
}

/// Registry key of short alias number `n`.
pub fn short_alias_key(n: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[24..].copy_from_slice(&n.to_be_bytes());
    key
}

/// Parse the hex text form of a short alias (`@` already stripped).
pub fn parse_short_alias(hexstr: &str) -> BwResult<u64> {
    let padded = if hexstr.len() % 2 == 1 {
        format!("0{hexstr}")
    } else {
        hexstr.to_string()
    };
    let bin = hex::decode(&padded)
        .map_err(|_| BwError::new(StatusCode::UnresolvedAlias, "bad hex for short alias"))?;
    if bin.is_empty() || bin.len() > 8 {
        return Err(BwError::new(
            StatusCode::UnresolvedAlias,
            "short alias out of range",
        ));
    }
    Ok(bin.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Text before the first zero byte of an alias value.
pub fn value_as_text(value: &[u8; 32]) -> String {
    let end = value.iter().position(|b| *b == 0).unwrap_or(value.len());
    String::from_utf8_lossy(&value[..end]).into_owned()
}
