//! # Primitive Entities
//!
//! Fixed-size byte identifiers shared by every subsystem, plus the
//! registry validity state that the resolver, chain builder and message
//! pipeline all reason about.

use chrono::{DateTime, TimeZone, Utc};

/// Ed25519 verifying key (32 bytes).
pub type Vk = [u8; 32];

/// SHA-256 digest (32 bytes).
pub type Hash32 = [u8; 32];

/// Ed25519 signature (64 bytes).
pub type SigBytes = [u8; 64];

/// Distinguished verifying key that means "any recipient".
///
/// A chain whose final receiver is this key is valid for every origin,
/// provided the message names its origin with an OriginVK routing object.
pub const EVERYBODY_VK: Vk = [
    0xfb, 0xef, 0xbe, 0x12, 0xa3, 0xff, 0xfd, 0x66, 0x38, 0xef, 0xb9, 0xe8, 0x7c, 0xc6, 0x14, 0xcf,
    0x63, 0x0d, 0x14, 0x1b, 0x1f, 0x6b, 0x92, 0x0a, 0xfd, 0x10, 0x65, 0x46, 0xf2, 0xa9, 0xb4, 0x36,
];

/// Copy a slice into a 32-byte array, if it has exactly that length.
pub fn to_array32(bytes: &[u8]) -> Option<[u8; 32]> {
    bytes.try_into().ok()
}

/// Registry state of an entity, DOT or chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidityState {
    /// The registry has never seen the object.
    #[default]
    Unknown,
    /// Present, unexpired and unrevoked (and so are its dependencies).
    Valid,
    /// Past its declared expiry.
    Expired,
    /// A valid revocation exists.
    Revoked,
    /// The registry reported an error while resolving.
    Error,
}

impl ValidityState {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Combine two states: the result is only `Valid` when both are.
    ///
    /// Severity order is `Error` > `Revoked` > `Expired` > `Unknown` > `Valid`.
    pub fn combine(self, other: ValidityState) -> ValidityState {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Valid => 0,
            Self::Unknown => 1,
            Self::Expired => 2,
            Self::Revoked => 3,
            Self::Error => 4,
        }
    }

    /// Lowercase name used in `validity` headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Error => "error",
        }
    }
}

/// Wall-clock time with millisecond precision, as carried on the wire.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to whole milliseconds.
pub fn now_millis() -> Timestamp {
    from_millis(Utc::now().timestamp_millis())
}

/// Time from milliseconds since the Unix epoch.
pub fn from_millis(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Milliseconds since the Unix epoch.
pub fn to_millis(ts: &Timestamp) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_prefers_worst_state() {
        use ValidityState::*;
        assert_eq!(Valid.combine(Valid), Valid);
        assert_eq!(Valid.combine(Expired), Expired);
        assert_eq!(Revoked.combine(Expired), Revoked);
        assert_eq!(Unknown.combine(Valid), Unknown);
        assert_eq!(Expired.combine(Error), Error);
    }

    #[test]
    fn test_millis_round_trip() {
        let now = now_millis();
        assert_eq!(from_millis(to_millis(&now)), now);
    }

    #[test]
    fn test_to_array32() {
        assert!(to_array32(&[0u8; 31]).is_none());
        assert_eq!(to_array32(&[7u8; 32]), Some([7u8; 32]));
    }
}
