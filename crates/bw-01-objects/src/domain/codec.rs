//! Bounds-checked cursor and the TLV metadata block shared by entities,
//! DOTs and revocations.

use shared_types::{from_millis, to_millis, BwError, BwResult, StatusCode, Timestamp, Vk};

pub(crate) const TLV_CREATED: u8 = 0x02;
pub(crate) const TLV_EXPIRY: u8 = 0x03;
pub(crate) const TLV_REVOKER: u8 = 0x04;
pub(crate) const TLV_CONTACT: u8 = 0x05;
pub(crate) const TLV_COMMENT: u8 = 0x06;
pub(crate) const TLV_END: u8 = 0x00;

/// Maximum length of contact and comment strings.
pub const MAX_TEXT_LEN: usize = 255;

pub(crate) fn truncated(what: &str) -> BwError {
    BwError::new(StatusCode::InvalidCoding, format!("truncated {what}"))
}

/// Read-only cursor over a byte slice. Every read fails cleanly instead of
/// panicking on short input.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> BwResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(truncated(self.what));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> BwResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16_le(&mut self) -> BwResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32_le(&mut self) -> BwResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64_le(&mut self) -> BwResult<u64> {
        let mut a = [0u8; 8];
        a.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(a))
    }

    pub(crate) fn array32(&mut self) -> BwResult<[u8; 32]> {
        let mut a = [0u8; 32];
        a.copy_from_slice(self.take(32)?);
        Ok(a)
    }

    pub(crate) fn array64(&mut self) -> BwResult<[u8; 64]> {
        let mut a = [0u8; 64];
        a.copy_from_slice(self.take(64)?);
        Ok(a)
    }

    pub(crate) fn utf8(&mut self, n: usize) -> BwResult<String> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| {
                BwError::new(
                    StatusCode::InvalidCoding,
                    format!("non-utf8 text in {}", self.what),
                )
            })
    }
}

/// Optional metadata carried in the TLV block of signed objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub created: Option<Timestamp>,
    pub expiry: Option<Timestamp>,
    pub revokers: Vec<Vk>,
    pub contact: String,
    pub comment: String,
}

impl Metadata {
    pub(crate) fn check(&self) -> BwResult<()> {
        if self.contact.len() > MAX_TEXT_LEN || self.comment.len() > MAX_TEXT_LEN {
            return Err(BwError::new(
                StatusCode::InvalidCoding,
                "contact and comment are limited to 255 bytes",
            ));
        }
        Ok(())
    }

    /// Append the TLV block including the terminating zero.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        if let Some(created) = &self.created {
            out.push(TLV_CREATED);
            out.push(8);
            out.extend_from_slice(&(to_millis(created) as u64).to_le_bytes());
        }
        if let Some(expiry) = &self.expiry {
            out.push(TLV_EXPIRY);
            out.push(8);
            out.extend_from_slice(&(to_millis(expiry) as u64).to_le_bytes());
        }
        for revoker in &self.revokers {
            out.push(TLV_REVOKER);
            out.push(32);
            out.extend_from_slice(revoker);
        }
        if !self.contact.is_empty() {
            out.push(TLV_CONTACT);
            out.push(self.contact.len() as u8);
            out.extend_from_slice(self.contact.as_bytes());
        }
        if !self.comment.is_empty() {
            out.push(TLV_COMMENT);
            out.push(self.comment.len() as u8);
            out.extend_from_slice(self.comment.as_bytes());
        }
        out.push(TLV_END);
    }

    /// Parse a TLV block up to and including its terminating zero.
    /// Unknown types are skipped by their declared length.
    pub(crate) fn decode(r: &mut Reader<'_>) -> BwResult<Self> {
        let mut meta = Metadata::default();
        loop {
            let tag = r.u8()?;
            if tag == TLV_END {
                return Ok(meta);
            }
            let len = r.u8()? as usize;
            match tag {
                TLV_CREATED | TLV_EXPIRY if len == 8 => {
                    let ts = from_millis(r.u64_le()? as i64);
                    if tag == TLV_CREATED {
                        meta.created = Some(ts);
                    } else {
                        meta.expiry = Some(ts);
                    }
                }
                TLV_REVOKER if len == 32 => meta.revokers.push(r.array32()?),
                TLV_CONTACT => meta.contact = r.utf8(len)?,
                TLV_COMMENT => meta.comment = r.utf8(len)?,
                TLV_CREATED | TLV_EXPIRY | TLV_REVOKER => {
                    return Err(BwError::new(
                        StatusCode::InvalidCoding,
                        format!("bad length {len} for TLV 0x{tag:02x}"),
                    ))
                }
                _ => {
                    r.take(len)?;
                }
            }
        }
    }

    pub(crate) fn is_expired(&self, now: &Timestamp) -> bool {
        matches!(&self.expiry, Some(expiry) if expiry < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::now_millis;

    #[test]
    fn test_metadata_round_trip() {
        let meta = Metadata {
            created: Some(now_millis()),
            expiry: Some(from_millis(1_900_000_000_000)),
            revokers: vec![[3u8; 32], [4u8; 32]],
            contact: "ops@example.org".into(),
            comment: "door sensors".into(),
        };
        let mut buf = Vec::new();
        meta.encode(&mut buf);
        let mut r = Reader::new(&buf, "test");
        assert_eq!(Metadata::decode(&mut r).unwrap(), meta);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_unknown_tlv_is_skipped() {
        let buf = [0x7f, 3, 1, 2, 3, TLV_CONTACT, 1, b'x', TLV_END];
        let mut r = Reader::new(&buf, "test");
        let meta = Metadata::decode(&mut r).unwrap();
        assert_eq!(meta.contact, "x");
    }

    #[test]
    fn test_truncated_block_fails() {
        let buf = [TLV_CREATED, 8, 1, 2];
        let mut r = Reader::new(&buf, "test");
        assert!(Metadata::decode(&mut r).is_err());
    }
}
