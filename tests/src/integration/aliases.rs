//! # Aliases
//!
//! Long aliases map a name of up to 32 bytes to a 32-byte value; short
//! aliases are numbered by the registry. Both resolve through the router
//! and through key names (`@hex` for short aliases).

#[cfg(test)]
mod tests {
    use bw_03_resolver::value_as_text;
    use shared_types::StatusCode;

    use crate::integration::fixtures::Network;

    fn padded(text: &[u8]) -> [u8; 32] {
        let mut v = [0u8; 32];
        v[..text.len()].copy_from_slice(text);
        v
    }

    #[tokio::test]
    async fn test_long_alias_round_trip() {
        let net = Network::new().await;
        let e = net.entity().await;
        let c = net.client_as(&e);

        let value = padded(b"building-4");
        c.make_long_alias(b"foo", value).await.unwrap();
        assert_eq!(c.resolve_long_alias(b"foo").await.unwrap(), Some(value));
        assert_eq!(value_as_text(&value), "building-4");
        assert_eq!(c.resolve_long_alias(b"bar").await.unwrap(), None);

        let err = c.make_long_alias(b"foo", padded(b"x")).await.unwrap_err();
        assert_eq!(err.code, StatusCode::AliasExists);
    }

    #[tokio::test]
    async fn test_alias_names_resolve_as_keys() {
        let net = Network::new().await;
        let e = net.entity().await;
        let c = net.client_as(&e);

        c.make_long_alias(b"home", *e.vk()).await.unwrap();
        let n = c.make_short_alias(*e.vk()).await.unwrap();
        assert_eq!(c.resolve_short_alias(n).await.unwrap(), Some(*e.vk()));

        let resolver = net.router.resolver();
        assert_eq!(resolver.resolve_key("home").await.unwrap(), *e.vk());
        assert_eq!(
            resolver.resolve_key(&format!("@{n:x}")).await.unwrap(),
            *e.vk()
        );
    }
}
