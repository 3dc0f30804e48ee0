//! # Revocation Cascade
//!
//! Revoking an intermediate entity on the registry must invalidate every
//! chain passing through it within one round of registry events, even
//! though the router had already verified and cached those chains.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bw_06_message_pipeline::MessageRequest;
    use shared_types::StatusCode;

    use crate::integration::fixtures::{eventually, Network};

    #[tokio::test]
    async fn test_revoked_intermediate_entity_blocks_chain() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;
        let chain = net.chain(&[&d1, &d2]).await;
        let publisher = net.client_as(&user);

        // Warm the resolver caches.
        let req = MessageRequest::new(*ns.vk(), "a/b/c").with_chain(chain.clone());
        publisher.publish(req, false).await.unwrap();

        let revoker = net.client_as(&mid);
        let revocation = revoker.create_revocation(*mid.vk(), "compromised").unwrap();
        revoker.put_revocation(&revocation).await.unwrap();

        let rejected = eventually(Duration::from_secs(2), || {
            let req = MessageRequest::new(*ns.vk(), "a/b/c").with_chain(chain.clone());
            let publisher = &publisher;
            async move {
                match publisher.publish(req, false).await {
                    Err(e) => {
                        assert!(
                            matches!(e.code, StatusCode::RevokedEntity | StatusCode::RevokedDOT),
                            "unexpected rejection {e}"
                        );
                        true
                    }
                    Ok(_) => false,
                }
            }
        })
        .await;
        assert!(rejected, "chain through a revoked entity still accepted");
    }

    #[tokio::test]
    async fn test_revoked_dot_blocks_chain() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/*", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/*", "P", 4).await;
        let chain = net.chain(&[&d1, &d2]).await;
        let publisher = net.client_as(&user);
        let req = MessageRequest::new(*ns.vk(), "a/x").with_chain(chain.clone());
        publisher.publish(req, false).await.unwrap();

        let giver = net.client_as(&mid);
        let revocation = giver.create_revocation(*d2.hash(), "").unwrap();
        giver.put_revocation(&revocation).await.unwrap();

        let rejected = eventually(Duration::from_secs(2), || {
            let req = MessageRequest::new(*ns.vk(), "a/x").with_chain(chain.clone());
            let publisher = &publisher;
            async move {
                matches!(
                    publisher.publish(req, false).await,
                    Err(e) if e.code == StatusCode::RevokedDOT
                )
            }
        })
        .await;
        assert!(rejected);

        // A DOT can only be revoked once.
        let again = giver.create_revocation(*d2.hash(), "").unwrap();
        let err = giver.put_revocation(&again).await.unwrap_err();
        assert_eq!(err.code, StatusCode::NotRevokable);
    }
}
