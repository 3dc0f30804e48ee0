//! Signed messages.
//!
//! ```text
//! type[1] | msgid[2 LE] | mvk[32] | suffix_len[2 LE] | suffix
//!   | consumers[1]                      (publish and persist only)
//!   | (ronum[1] | len[2 LE] | bytes)* | 0x00
//!   | (ponum[4 LE] | len[4 LE] | bytes)* | 0x00000000
//!   | signature[64]
//! ```

use super::codec::Reader;
use super::dchain::DChain;
use super::dot::Dot;
use super::entity::Entity;
use super::payload::PayloadObject;
use super::routing::RoutingObject;
use shared_crypto::{fmt_key, verify_blob};
use shared_types::{
    AccessPermissions, BwError, BwResult, SigBytes, StatusCode, SuffixInfo, Timestamp, Vk,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Publish = 0x01,
    Persist = 0x02,
    Subscribe = 0x03,
    Tap = 0x04,
    Query = 0x05,
    TapQuery = 0x06,
    List = 0x07,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => Self::Publish,
            0x02 => Self::Persist,
            0x03 => Self::Subscribe,
            0x04 => Self::Tap,
            0x05 => Self::Query,
            0x06 => Self::TapQuery,
            0x07 => Self::List,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Publish and persist carry a consumer limit byte.
    pub fn carries_consumers(self) -> bool {
        matches!(self, Self::Publish | Self::Persist)
    }

    /// Types that may never target a wildcard topic.
    pub fn needs_concrete_topic(self) -> bool {
        matches!(self, Self::Publish | Self::Persist | Self::List)
    }

    /// Permissions a chain must grant for this type on a (merged) topic.
    pub fn required_permissions(self, topic: &SuffixInfo) -> AccessPermissions {
        let mut p = AccessPermissions::default();
        match self {
            Self::Publish | Self::Persist => p.publish = true,
            Self::Subscribe | Self::Query => {
                p.consume = true;
                p.consume_plus = topic.has_plus;
                p.consume_star = topic.has_star;
            }
            Self::Tap | Self::TapQuery => {
                p.tap = true;
                p.tap_plus = topic.has_plus;
                p.tap_star = topic.has_star;
            }
            Self::List => p.list = true,
        }
        p
    }
}

/// Message identity: the message id plus the low 64 bits of the signature.
/// Doubles as the subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueMessageId {
    pub mid: u64,
    pub sig: u64,
}

impl fmt::Display for UniqueMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.mid, self.sig)
    }
}

impl FromStr for UniqueMessageId {
    type Err = BwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || BwError::new(StatusCode::InvalidCoding, format!("bad handle {s:?}"));
        if s.len() != 32 || !s.is_ascii() {
            return Err(bad());
        }
        let mid = u64::from_str_radix(&s[..16], 16).map_err(|_| bad())?;
        let sig = u64::from_str_radix(&s[16..], 16).map_err(|_| bad())?;
        Ok(Self { mid, sig })
    }
}

/// Everything that goes into a message before signing.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub mtype: MessageType,
    pub msgid: u16,
    pub mvk: Vk,
    pub suffix: String,
    pub consumers: u8,
    pub routing_objects: Vec<RoutingObject>,
    pub payload_objects: Vec<PayloadObject>,
}

#[derive(Debug, Clone)]
pub struct Message {
    mtype: MessageType,
    msgid: u16,
    mvk: Vk,
    suffix: String,
    consumers: u8,
    routing_objects: Vec<RoutingObject>,
    payload_objects: Vec<PayloadObject>,
    signature: SigBytes,
    encoded: Vec<u8>,
    sig_cover_end: usize,

    origin_vk: Option<Vk>,
    expiry: Option<Timestamp>,
    primary_chain: Option<DChain>,
    merged_suffix: Option<String>,
    umid: UniqueMessageId,
}

impl Message {
    /// Encode and sign as `signer`.
    pub fn sign(params: MessageParams, signer: &Entity) -> BwResult<Self> {
        if params.suffix.len() > u16::MAX as usize {
            return Err(BwError::new(StatusCode::BadURI, "topic suffix too long"));
        }
        let mut b = Vec::with_capacity(4096);
        b.push(params.mtype.as_u8());
        b.extend_from_slice(&params.msgid.to_le_bytes());
        b.extend_from_slice(&params.mvk);
        b.extend_from_slice(&(params.suffix.len() as u16).to_le_bytes());
        b.extend_from_slice(params.suffix.as_bytes());
        if params.mtype.carries_consumers() {
            b.push(params.consumers);
        }
        for ro in &params.routing_objects {
            let content = ro.content();
            if content.len() > u16::MAX as usize {
                return Err(BwError::new(
                    StatusCode::InvalidCoding,
                    format!("routing object 0x{:02x} too large", ro.ro_num()),
                ));
            }
            b.push(ro.ro_num());
            b.extend_from_slice(&(content.len() as u16).to_le_bytes());
            b.extend_from_slice(&content);
        }
        b.push(0);
        for po in &params.payload_objects {
            if po.ponum == 0 || po.content.len() > u32::MAX as usize {
                return Err(BwError::new(
                    StatusCode::InvalidCoding,
                    format!("payload object {} cannot be encoded", po.dot_form()),
                ));
            }
            b.extend_from_slice(&po.ponum.to_le_bytes());
            b.extend_from_slice(&(po.content.len() as u32).to_le_bytes());
            b.extend_from_slice(&po.content);
        }
        b.extend_from_slice(&0u32.to_le_bytes());
        let signature = signer.sign(&b)?;
        b.extend_from_slice(&signature);
        Self::decode(&b)
    }

    /// Parse an encoded message. Routing objects that fail to decode are
    /// logged and skipped; anything else malformed fails the whole message.
    pub fn decode(encoded: &[u8]) -> BwResult<Self> {
        Self::decode_inner(encoded)
            .map_err(|e| BwError::new(StatusCode::MalformedMessage, e.message))
    }

    fn decode_inner(encoded: &[u8]) -> BwResult<Self> {
        let mut r = Reader::new(encoded, "message");
        let raw_type = r.u8()?;
        let mtype = MessageType::from_u8(raw_type).ok_or_else(|| {
            BwError::new(
                StatusCode::MalformedMessage,
                format!("unknown message type 0x{raw_type:02x}"),
            )
        })?;
        let msgid = r.u16_le()?;
        let mvk = r.array32()?;
        let suffix_len = r.u16_le()? as usize;
        let suffix = r.utf8(suffix_len)?;
        let consumers = if mtype.carries_consumers() { r.u8()? } else { 0 };

        let mut routing_objects = Vec::new();
        let mut origin_vk = None;
        let mut expiry = None;
        let mut primary_chain = None;
        loop {
            let ronum = r.u8()?;
            if ronum == 0 {
                break;
            }
            let len = r.u16_le()? as usize;
            let content = r.take(len)?;
            let ro = match RoutingObject::decode(ronum, content) {
                Ok(ro) => ro,
                Err(e) => {
                    warn!(ronum = ronum, error = %e, "skipping bad routing object");
                    continue;
                }
            };
            match &ro {
                RoutingObject::Chain(c) if c.is_access() && primary_chain.is_none() => {
                    primary_chain = Some(c.clone())
                }
                RoutingObject::OriginVk(vk) if origin_vk.is_none() => origin_vk = Some(*vk),
                RoutingObject::Expiry(t) if expiry.is_none() => expiry = Some(*t),
                _ => {}
            }
            routing_objects.push(ro);
        }

        let mut payload_objects = Vec::new();
        loop {
            let ponum = r.u32_le()?;
            if ponum == 0 {
                break;
            }
            let len = r.u32_le()? as usize;
            payload_objects.push(PayloadObject::new(ponum, r.take(len)?));
        }

        let sig_cover_end = r.position();
        let signature = r.array64()?;
        if r.remaining() != 0 {
            return Err(BwError::new(
                StatusCode::MalformedMessage,
                "trailing bytes after message signature",
            ));
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&signature[..8]);
        let umid = UniqueMessageId {
            mid: u64::from(msgid),
            sig: u64::from_le_bytes(low),
        };
        Ok(Self {
            mtype,
            msgid,
            mvk,
            suffix,
            consumers,
            routing_objects,
            payload_objects,
            signature,
            encoded: encoded.to_vec(),
            sig_cover_end,
            origin_vk,
            expiry,
            primary_chain,
            merged_suffix: None,
            umid,
        })
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn mtype(&self) -> MessageType {
        self.mtype
    }

    pub fn msgid(&self) -> u16 {
        self.msgid
    }

    pub fn mvk(&self) -> &Vk {
        &self.mvk
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `base64(mvk)/suffix`
    pub fn topic(&self) -> String {
        format!("{}/{}", fmt_key(&self.mvk), self.suffix)
    }

    pub fn consumers(&self) -> u8 {
        self.consumers
    }

    pub fn routing_objects(&self) -> &[RoutingObject] {
        &self.routing_objects
    }

    pub fn payload_objects(&self) -> &[PayloadObject] {
        &self.payload_objects
    }

    /// Access DOTs carried inline.
    pub fn access_dots(&self) -> impl Iterator<Item = &Arc<Dot>> {
        self.routing_objects
            .iter()
            .filter_map(RoutingObject::as_access_dot)
    }

    pub fn signature(&self) -> &SigBytes {
        &self.signature
    }

    /// The origin named by an OriginVK routing object, or the one derived
    /// during verification.
    pub fn origin_vk(&self) -> Option<&Vk> {
        self.origin_vk.as_ref()
    }

    pub fn set_origin_vk(&mut self, vk: Vk) {
        self.origin_vk = Some(vk);
    }

    pub fn expiry(&self) -> Option<&Timestamp> {
        self.expiry.as_ref()
    }

    pub fn is_expired(&self, now: &Timestamp) -> bool {
        matches!(&self.expiry, Some(e) if e < now)
    }

    /// First access chain routing object.
    pub fn primary_access_chain(&self) -> Option<&DChain> {
        self.primary_chain.as_ref()
    }

    /// Topic after restriction by the authorising chain; falls back to the
    /// suffix before verification.
    pub fn merged_suffix(&self) -> &str {
        self.merged_suffix.as_deref().unwrap_or(&self.suffix)
    }

    pub fn set_merged_suffix(&mut self, suffix: String) {
        self.merged_suffix = Some(suffix);
    }

    pub fn umid(&self) -> UniqueMessageId {
        self.umid
    }

    /// Verify the message signature under `vk`.
    pub fn sig_valid_for(&self, vk: &Vk) -> bool {
        verify_blob(vk, &self.signature, &self.encoded[..self.sig_cover_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codec::Metadata;
    use crate::domain::routing::ronum;
    use shared_types::ponum::PO_MESSAGE;
    use shared_types::{from_millis, now_millis};

    fn params(mtype: MessageType, signer: &Entity) -> MessageParams {
        MessageParams {
            mtype,
            msgid: 0x1234,
            mvk: *signer.vk(),
            suffix: "building/floor/+".into(),
            consumers: 2,
            routing_objects: vec![
                RoutingObject::OriginVk(*signer.vk()),
                RoutingObject::Expiry(from_millis(1_000)),
            ],
            payload_objects: vec![PayloadObject::new(PO_MESSAGE, b"body".to_vec())],
        }
    }

    #[test]
    fn test_sign_and_decode() {
        let e = Entity::create(Metadata::default()).unwrap();
        let m = Message::sign(params(MessageType::Publish, &e), &e).unwrap();
        assert!(m.sig_valid_for(e.vk()));

        let d = Message::decode(m.encoded()).unwrap();
        assert_eq!(d.encoded(), m.encoded());
        assert_eq!(d.mtype(), MessageType::Publish);
        assert_eq!(d.msgid(), 0x1234);
        assert_eq!(d.consumers(), 2);
        assert_eq!(d.origin_vk(), Some(e.vk()));
        assert!(d.is_expired(&now_millis()));
        assert_eq!(d.payload_objects()[0].content, b"body");
        assert_eq!(d.umid(), m.umid());
        assert_eq!(d.umid().mid, 0x1234);
        assert!(d.topic().ends_with("/building/floor/+"));
    }

    #[test]
    fn test_consumers_only_on_publish() {
        let e = Entity::create(Metadata::default()).unwrap();
        let m = Message::sign(params(MessageType::Subscribe, &e), &e).unwrap();
        let d = Message::decode(m.encoded()).unwrap();
        assert_eq!(d.consumers(), 0);
        // one byte shorter than the publish form
        let p = Message::sign(params(MessageType::Publish, &e), &e).unwrap();
        assert_eq!(p.encoded().len(), m.encoded().len() + 1);
    }

    #[test]
    fn test_bad_routing_object_is_skipped() {
        let e = Entity::create(Metadata::default()).unwrap();
        let mut p = params(MessageType::Query, &e);
        p.routing_objects.clear();
        let m = Message::sign(p, &e).unwrap();
        // splice a bogus 3-byte origin VK routing object in front of the terminator
        let mut bytes = m.encoded().to_vec();
        let ro_start = 1 + 2 + 32 + 2 + "building/floor/+".len();
        bytes.splice(ro_start..ro_start, [ronum::ORIGIN_VK, 3, 0, 1, 2, 3]);
        let d = Message::decode(&bytes).unwrap();
        assert!(d.routing_objects().is_empty());
        assert!(!d.sig_valid_for(e.vk()));
    }

    #[test]
    fn test_truncated_message_fails() {
        let e = Entity::create(Metadata::default()).unwrap();
        let m = Message::sign(params(MessageType::Publish, &e), &e).unwrap();
        let err = Message::decode(&m.encoded()[..m.encoded().len() - 1]).unwrap_err();
        assert_eq!(err.code, StatusCode::MalformedMessage);
    }

    #[test]
    fn test_umid_text_form() {
        let id = UniqueMessageId { mid: 7, sig: 0xdead_beef };
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert_eq!(s.parse::<UniqueMessageId>().unwrap(), id);
        assert!("xyz".parse::<UniqueMessageId>().is_err());
    }

    #[test]
    fn test_required_permissions() {
        let info = shared_types::analyze_suffix("a/+/b").unwrap();
        let p = MessageType::Subscribe.required_permissions(&info);
        assert!(p.consume && p.consume_plus && !p.consume_star);
        let p = MessageType::Publish.required_permissions(&info);
        assert_eq!(p.to_perm_string(), "P");
    }
}
