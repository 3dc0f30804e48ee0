//! Key layout. Every key starts with a short column family prefix.
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `dot/` | DOT hash | `ronum \| content` |
//! | `dch/` | chain hash | `ronum \| dot hashes` |
//! | `ent/` | entity VK | entity content |
//! | `msg/` | `base64(mvk)/suffix` | encoded message |

pub const CF_DOT: &[u8] = b"dot/";
pub const CF_CHAIN: &[u8] = b"dch/";
pub const CF_ENTITY: &[u8] = b"ent/";
pub const CF_MESSAGE: &[u8] = b"msg/";

pub fn key(cf: &[u8], id: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(cf.len() + id.len());
    k.extend_from_slice(cf);
    k.extend_from_slice(id);
    k
}

/// Key of the persisted message at `topic` (`base64(mvk)/suffix`).
pub fn message_key(topic: &str) -> Vec<u8> {
    key(CF_MESSAGE, topic.as_bytes())
}

/// Inverse of [`message_key`].
pub fn topic_of(message_key: &[u8]) -> Option<&str> {
    message_key
        .strip_prefix(CF_MESSAGE)
        .and_then(|t| std::str::from_utf8(t).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key_round_trip() {
        let k = message_key("ns/a/b");
        assert_eq!(topic_of(&k), Some("ns/a/b"));
        assert_eq!(topic_of(b"dot/xyz"), None);
    }
}
