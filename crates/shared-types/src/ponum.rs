//! Payload object numbers and their dotted-quad form.

use crate::errors::{BwError, StatusCode};

/// Encoded message (subscribe/query results).
pub const PO_MESSAGE: u32 = 0x0100_0101;
/// Entity with its signing key.
pub const PO_ENTITY_WITH_KEY: u32 = 0x0100_0102;
/// Access DChain hash.
pub const PO_ACCESS_CHAIN_HASH: u32 = 0x01;
/// Elaborated access DChain.
pub const PO_ACCESS_CHAIN: u32 = 0x02;
/// Permission DChain hash.
pub const PO_PERMISSION_CHAIN_HASH: u32 = 0x11;
/// Elaborated permission DChain.
pub const PO_PERMISSION_CHAIN: u32 = 0x12;
/// Access DOT.
pub const PO_ACCESS_DOT: u32 = 0x20;
/// Permission DOT.
pub const PO_PERMISSION_DOT: u32 = 0x21;
/// Revocation.
pub const PO_REVOCATION: u32 = 0x50;

/// `a.b.c.d` form of a PONum.
pub fn ponum_to_dot_form(ponum: u32) -> String {
    let [a, b, c, d] = ponum.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

/// Parse `a.b.c.d` into a PONum.
pub fn ponum_from_dot_form(dot_form: &str) -> Result<u32, BwError> {
    let parts: Vec<&str> = dot_form.split('.').collect();
    if parts.len() != 4 {
        return Err(bad_dot_form(dot_form));
    }
    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(parts) {
        *octet = part.parse().map_err(|_| bad_dot_form(dot_form))?;
    }
    Ok(u32::from_be_bytes(octets))
}

fn bad_dot_form(s: &str) -> BwError {
    BwError::new(StatusCode::InvalidCoding, format!("bad PO dot form {s:?}"))
}

/// A PONum pattern: `a.b.c.d` or `a.b.c.d/N`, where the high `N` bits must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoMask {
    pub ponum: u32,
    pub bits: u8,
}

impl PoMask {
    pub fn parse(s: &str) -> Result<Self, BwError> {
        let (dot, bits) = match s.split_once('/') {
            Some((dot, bits)) => {
                let bits: u8 = bits.parse().map_err(|_| bad_dot_form(s))?;
                if bits > 32 {
                    return Err(bad_dot_form(s));
                }
                (dot, bits)
            }
            None => (s, 32),
        };
        Ok(Self {
            ponum: ponum_from_dot_form(dot)?,
            bits,
        })
    }

    pub fn matches(&self, ponum: u32) -> bool {
        if self.bits == 0 {
            return true;
        }
        let shift = 32 - u32::from(self.bits);
        (ponum >> shift) == (self.ponum >> shift)
    }
}
