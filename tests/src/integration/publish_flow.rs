//! # Publish Flow
//!
//! Namespace `ns` grants `mid` access on `a/+/c` (TTL 5); `mid` grants
//! `user` access on `a/b/+` (TTL 4). The chain `[D1, D2]` lets `user`
//! publish on `a/b/c`. Narrowing D2 to `a/b/d` leaves nothing in common
//! with D1 and the message is rejected.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bw_01_objects::PayloadObject;
    use bw_02_object_store::{InMemoryKVStore, KeyValueStore, ObjectStore};
    use bw_03_resolver::RegistryProvider;
    use bw_06_message_pipeline::{MessageRequest, Router, RouterSettings};
    use shared_types::StatusCode;
    use tokio::time::timeout;

    use crate::integration::fixtures::Network;

    const TEXT: u32 = 0x4000_0000;

    #[tokio::test]
    async fn test_two_hop_publish_is_delivered() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;
        let chain = net.chain(&[&d1, &d2]).await;

        let owner = net.client_as(&ns);
        let mut stream = owner
            .subscribe(MessageRequest::new(*ns.vk(), "a/b/c"), false)
            .await
            .unwrap()
            .stream
            .unwrap();

        let publisher = net.client_as(&user);
        let req = MessageRequest::new(*ns.vk(), "a/b/c")
            .with_chain(chain)
            .with_payload(PayloadObject::new(TEXT, b"hello".to_vec()));
        assert_eq!(publisher.publish(req, false).await.unwrap(), 1);

        let got = timeout(Duration::from_secs(2), stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.origin_vk(), Some(user.vk()));
        assert_eq!(got.payload_objects()[0].content, b"hello");
    }

    #[tokio::test]
    async fn test_narrowed_grant_is_overconstrained() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/b/d", "P", 4).await;

        let chain = net.chain(&[&d1, &d2]).await;
        let req = MessageRequest::new(*ns.vk(), "a/b/c").with_chain(chain);
        let err = net.client_as(&user).publish(req, false).await.unwrap_err();
        assert_eq!(err.code, StatusCode::OverconstrainedURI);
    }

    #[tokio::test]
    async fn test_ttl_exhausted_chain_is_rejected() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/*", "P", 0).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/*", "P", 0).await;

        let chain = net.chain(&[&d1, &d2]).await;
        let req = MessageRequest::new(*ns.vk(), "a/b").with_chain(chain);
        let err = net.client_as(&user).publish(req, false).await.unwrap_err();
        assert_eq!(err.code, StatusCode::TTLExpired);
    }

    #[tokio::test]
    async fn test_second_router_elaborates_from_registry() {
        let net = Network::new().await;
        let (ns, mid, user) = (net.entity().await, net.entity().await, net.entity().await);
        let d1 = net.grant(&ns, mid.vk(), ns.vk(), "a/+/c", "P", 5).await;
        let d2 = net.grant(&mid, user.vk(), ns.vk(), "a/b/+", "P", 4).await;
        let chain = net.chain(&[&d1, &d2]).await;

        // Shares the registry but not the object store.
        let kv: Box<dyn KeyValueStore> = Box::new(InMemoryKVStore::new());
        let other = Arc::new(Router::new(
            RouterSettings::default(),
            Arc::new(ObjectStore::new(kv)),
            Arc::clone(&net.registry) as Arc<dyn RegistryProvider>,
        ));
        let c = other.create_client();
        c.set_entity_obj(Arc::clone(&user)).unwrap();
        let req = MessageRequest::new(*ns.vk(), "a/b/c").with_chain(chain.unelaborated());
        assert_eq!(c.publish(req, false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_then_query_and_list() {
        let net = Network::new().await;
        let ns = net.entity().await;
        let c = net.client_as(&ns);
        for (topic, body) in [("sensors/t1", "20"), ("sensors/t2", "21"), ("other/x", "0")] {
            let req = MessageRequest::new(*ns.vk(), topic)
                .with_payload(PayloadObject::new(TEXT, body.as_bytes().to_vec()));
            c.publish(req, true).await.unwrap();
        }

        let found = c
            .query(MessageRequest::new(*ns.vk(), "sensors/+"), false)
            .await
            .unwrap();
        let mut bodies: Vec<_> = found
            .iter()
            .map(|m| m.payload_objects()[0].content.clone())
            .collect();
        bodies.sort();
        assert_eq!(bodies, vec![b"20".to_vec(), b"21".to_vec()]);

        let mut children = c
            .list(MessageRequest::new(*ns.vk(), "sensors"))
            .await
            .unwrap();
        children.sort();
        assert_eq!(children, vec!["sensors/t1", "sensors/t2"]);
    }
}
