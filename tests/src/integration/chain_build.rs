//! # Chain Building
//!
//! With only D1 and D2 on the registry, a build for `user` on `a/b/c`
//! finds exactly the chain `[D1, D2]`.

#[cfg(test)]
mod tests {
    use bw_01_objects::chain_hash_of;
    use bw_06_message_pipeline::{BuildChainParams, MessageRequest};
    use shared_crypto::fmt_key;
    use shared_types::StatusCode;

    use crate::integration::fixtures::Network;

    #[tokio::test]
    async fn test_build_finds_the_two_hop_chain() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;

        let c = net.client_as(&user);
        let chains = c
            .build_chain(BuildChainParams {
                uri: format!("{}/a/b/c", fmt_key(ns.vk())),
                permissions: "P".to_string(),
                to: *user.vk(),
            })
            .await
            .unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(
            chains[0].chain_hash(),
            &chain_hash_of(&[*d1.hash(), *d2.hash()])
        );
    }

    #[tokio::test]
    async fn test_build_respects_permissions_and_target() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;
        let c = net.client_as(&user);
        let uri = format!("{}/a/b/c", fmt_key(ns.vk()));

        let consume = c
            .build_chain(BuildChainParams {
                uri: uri.clone(),
                permissions: "C".to_string(),
                to: *user.vk(),
            })
            .await
            .unwrap();
        assert!(consume.is_empty());

        let to_mid = c
            .build_chain(BuildChainParams {
                uri,
                permissions: "P".to_string(),
                to: *mid.vk(),
            })
            .await
            .unwrap();
        assert_eq!(to_mid.len(), 1);
        assert_eq!(to_mid[0].num_hashes(), 1);
    }

    #[tokio::test]
    async fn test_autochain_publish_and_failure() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;
        let c = net.client_as(&user);

        let ok = MessageRequest::new(*ns.vk(), "a/b/c").with_autochain();
        assert_eq!(c.publish(ok, false).await.unwrap(), 0);

        let denied = MessageRequest::new(*ns.vk(), "z/z").with_autochain();
        let err = c.publish(denied, false).await.unwrap_err();
        assert_eq!(err.code, StatusCode::ChainBuildFailed);
    }
}
