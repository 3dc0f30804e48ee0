//! # Terminus Service
//!
//! Local delivery for verified messages. Every message that reaches the
//! terminus has already passed signature and chain checks, and its merged
//! suffix is the one used for matching and persistence.

use crate::domain::{ClientId, SubscribeOutcome, Subscription, SubscriptionStream};
use bw_01_objects::{Message, MessageType, UniqueMessageId};
use bw_02_object_store::DynObjectStore;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use shared_crypto::fmt_key;
use shared_types::uri::split_cells;
use shared_types::{BwError, BwResult, StatusCode, Vk};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
pub struct TerminusConfig {
    /// Bound of each subscription's dispatch queue.
    pub queue_depth: usize,
}

impl Default for TerminusConfig {
    fn default() -> Self {
        Self { queue_depth: 256 }
    }
}

#[derive(Default)]
struct SubscriptionTable {
    by_umid: HashMap<UniqueMessageId, Subscription>,
    /// (client, mvk, pattern) -> handle, for idempotent re-subscribe
    by_client_pattern: HashMap<(ClientId, Vk, String), UniqueMessageId>,
    by_client: HashMap<ClientId, HashSet<UniqueMessageId>>,
}

impl SubscriptionTable {
    fn remove(&mut self, umid: &UniqueMessageId) -> Option<Subscription> {
        let sub = self.by_umid.remove(umid)?;
        self.by_client_pattern
            .remove(&(sub.client, sub.mvk, sub.pattern.clone()));
        if let Some(set) = self.by_client.get_mut(&sub.client) {
            set.remove(umid);
        }
        Some(sub)
    }
}

pub struct Terminus {
    config: TerminusConfig,
    store: Arc<DynObjectStore>,
    subs: RwLock<SubscriptionTable>,
    next_client: AtomicU64,
}

impl Terminus {
    pub fn new(store: Arc<DynObjectStore>, config: TerminusConfig) -> Self {
        Self {
            config,
            store,
            subs: RwLock::new(SubscriptionTable::default()),
            next_client: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<DynObjectStore> {
        &self.store
    }

    pub fn new_client(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Enqueue `msg` on every matching subscription and return how many
    /// queues took it. A non-zero consumer limit caps delivery to that many
    /// randomly chosen non-tap subscriptions; taps always receive.
    pub fn publish(&self, msg: &Message) -> usize {
        let suffix = msg.merged_suffix();
        let cells = split_cells(suffix);
        let msg = Arc::new(msg.clone());

        let mut targets: Vec<(bool, broadcast::Sender<Arc<Message>>)> = {
            let table = self.subs.read();
            table
                .by_umid
                .values()
                .filter(|s| s.matches(msg.mvk(), &cells))
                .map(|s| (s.tap, s.queue.clone()))
                .collect()
        };

        let limit = msg.consumers() as usize;
        if limit != 0 {
            targets.shuffle(&mut rand::thread_rng());
        }
        let mut delivered = 0usize;
        let mut consumers = 0usize;
        for (tap, queue) in targets {
            if !tap {
                if limit != 0 && consumers >= limit {
                    continue;
                }
                consumers += 1;
            }
            if queue.send(Arc::clone(&msg)).is_ok() {
                delivered += 1;
            }
        }
        trace!(topic = %suffix, delivered, "published");
        delivered
    }

    /// Store `msg` as the last value on its topic, then publish it.
    pub fn persist(&self, msg: &Message) -> BwResult<usize> {
        self.store.put_message(msg.mvk(), msg.merged_suffix(), msg)?;
        Ok(self.publish(msg))
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe `client` with a verified subscribe or tap message. The
    /// handle is the message's UMID; re-subscribing the same pattern from
    /// the same client returns the original handle.
    pub fn subscribe(&self, client: ClientId, msg: &Message) -> BwResult<SubscribeOutcome> {
        let tap = match msg.mtype() {
            MessageType::Subscribe => false,
            MessageType::Tap => true,
            other => {
                return Err(BwError::new(
                    StatusCode::BadOperation,
                    format!("{other:?} is not a subscription"),
                ))
            }
        };
        let pattern = msg.merged_suffix().to_string();
        let key = (client, *msg.mvk(), pattern.clone());

        let mut table = self.subs.write();
        if let Some(existing) = table.by_client_pattern.get(&key).copied() {
            debug!(%client, handle = %existing, "duplicate subscription");
            return Ok(SubscribeOutcome {
                umid: existing,
                duplicate: true,
                stream: None,
            });
        }

        let umid = msg.umid();
        if table.by_umid.contains_key(&umid) {
            return Err(BwError::new(
                StatusCode::BadOperation,
                format!("handle {umid} already in use"),
            ));
        }
        let (queue, rx) = broadcast::channel(self.config.queue_depth.max(1));
        let cells = split_cells(&pattern).into_iter().map(String::from).collect();
        table.by_umid.insert(
            umid,
            Subscription {
                umid,
                client,
                mvk: *msg.mvk(),
                pattern: pattern.clone(),
                cells,
                tap,
                queue,
            },
        );
        table.by_client_pattern.insert(key, umid);
        table.by_client.entry(client).or_default().insert(umid);
        info!(
            %client,
            handle = %umid,
            topic = %format!("{}/{}", fmt_key(msg.mvk()), pattern),
            tap,
            "subscribed"
        );
        Ok(SubscribeOutcome {
            umid,
            duplicate: false,
            stream: Some(SubscriptionStream::new(umid, rx)),
        })
    }

    /// Cancel a subscription owned by `client`. Its stream ends once drained.
    pub fn unsubscribe(&self, client: ClientId, umid: &UniqueMessageId) -> BwResult<()> {
        let mut table = self.subs.write();
        match table.by_umid.get(umid) {
            Some(sub) if sub.client == client => {}
            _ => {
                return Err(BwError::new(
                    StatusCode::UnsubscribeError,
                    format!("no subscription {umid} for this client"),
                ))
            }
        }
        table.remove(umid);
        info!(%client, handle = %umid, "unsubscribed");
        Ok(())
    }

    /// Drop every subscription of a departing client.
    pub fn destroy_client(&self, client: ClientId) {
        let mut table = self.subs.write();
        let umids = table.by_client.remove(&client).unwrap_or_default();
        for umid in &umids {
            table.remove(umid);
        }
        debug!(%client, subscriptions = umids.len(), "client destroyed");
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.read().by_umid.len()
    }

    // =========================================================================
    // Persisted messages
    // =========================================================================

    /// Persisted messages whose topic matches the query's pattern.
    pub fn query(&self, msg: &Message) -> BwResult<Vec<Message>> {
        let found = self
            .store
            .matching_messages(msg.mvk(), msg.merged_suffix())?;
        debug!(pattern = %msg.merged_suffix(), results = found.len(), "query");
        Ok(found.into_iter().map(|(_, m)| m).collect())
    }

    /// Immediate children of the list message's suffix that hold persisted
    /// messages, as full suffixes.
    pub fn list(&self, msg: &Message) -> BwResult<Vec<String>> {
        let prefix = msg.merged_suffix().trim_end_matches('/');
        self.store.list_children(msg.mvk(), prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_01_objects::{Entity, MessageParams, Metadata, PayloadObject};
    use bw_02_object_store::{InMemoryKVStore, KeyValueStore, ObjectStore};
    use std::time::Duration;

    fn terminus(depth: usize) -> Terminus {
        let kv: Box<dyn KeyValueStore> = Box::new(InMemoryKVStore::new());
        Terminus::new(
            Arc::new(ObjectStore::new(kv)),
            TerminusConfig { queue_depth: depth },
        )
    }

    fn message(
        signer: &Entity,
        ns: &Vk,
        mtype: MessageType,
        msgid: u16,
        suffix: &str,
        consumers: u8,
        body: &[u8],
    ) -> Message {
        Message::sign(
            MessageParams {
                mtype,
                msgid,
                mvk: *ns,
                suffix: suffix.into(),
                consumers,
                routing_objects: vec![],
                payload_objects: vec![PayloadObject::new(0x0100_0000, body.to_vec())],
            },
            signer,
        )
        .unwrap()
    }

    struct Setup {
        tm: Terminus,
        e: Entity,
        ns: Vk,
    }

    fn setup(depth: usize) -> Setup {
        let e = Entity::create(Metadata::default()).unwrap();
        let ns = *e.vk();
        Setup {
            tm: terminus(depth),
            e,
            ns,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let s = setup(8);
        let c = s.tm.new_client();
        let mut exact = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 1, "a/b/c", 0, b""))
            .unwrap()
            .stream
            .unwrap();
        let mut wild = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 2, "a/*", 0, b""))
            .unwrap()
            .stream
            .unwrap();
        s.tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 3, "x/+", 0, b""))
            .unwrap();

        let n = s
            .tm
            .publish(&message(&s.e, &s.ns, MessageType::Publish, 9, "a/b/c", 0, b"hi"));
        assert_eq!(n, 2);
        assert_eq!(exact.recv().await.unwrap().msgid(), 9);
        assert_eq!(wild.recv().await.unwrap().msgid(), 9);
    }

    #[tokio::test]
    async fn test_resubscribe_is_idempotent() {
        let s = setup(8);
        let c = s.tm.new_client();
        let sub = message(&s.e, &s.ns, MessageType::Subscribe, 1, "a/+", 0, b"");
        let first = s.tm.subscribe(c, &sub).unwrap();
        let again = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 7, "a/+", 0, b""))
            .unwrap();
        assert!(!first.duplicate);
        assert!(again.duplicate);
        assert_eq!(first.umid, again.umid);
        assert_eq!(first.umid, sub.umid());
        assert_eq!(s.tm.subscription_count(), 1);

        // another client gets its own subscription
        let other = s.tm.new_client();
        let third = s
            .tm
            .subscribe(other, &message(&s.e, &s.ns, MessageType::Subscribe, 8, "a/+", 0, b""))
            .unwrap();
        assert!(!third.duplicate);
        assert_eq!(s.tm.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let s = setup(2);
        let c = s.tm.new_client();
        let mut stream = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 1, "t", 0, b""))
            .unwrap()
            .stream
            .unwrap();
        for id in 10..15 {
            s.tm
                .publish(&message(&s.e, &s.ns, MessageType::Publish, id, "t", 0, b""));
        }
        assert_eq!(stream.recv().await.unwrap().msgid(), 13);
        assert_eq!(stream.recv().await.unwrap().msgid(), 14);
        assert_eq!(stream.dropped(), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream() {
        let s = setup(4);
        let c = s.tm.new_client();
        let out = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, 1, "t", 0, b""))
            .unwrap();
        let mut stream = out.stream.unwrap();
        s.tm
            .publish(&message(&s.e, &s.ns, MessageType::Publish, 5, "t", 0, b""));

        let stranger = s.tm.new_client();
        let err = s.tm.unsubscribe(stranger, &out.umid).unwrap_err();
        assert_eq!(err.code, StatusCode::UnsubscribeError);

        s.tm.unsubscribe(c, &out.umid).unwrap();
        assert_eq!(stream.recv().await.unwrap().msgid(), 5);
        let end = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_consumer_limit_spares_taps() {
        let s = setup(4);
        let mut streams = Vec::new();
        for id in 0..3 {
            let c = s.tm.new_client();
            streams.push(
                s.tm
                    .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, id, "t", 0, b""))
                    .unwrap()
                    .stream
                    .unwrap(),
            );
        }
        let tapper = s.tm.new_client();
        let _tap = s
            .tm
            .subscribe(tapper, &message(&s.e, &s.ns, MessageType::Tap, 99, "t", 0, b""))
            .unwrap()
            .stream
            .unwrap();

        let n = s
            .tm
            .publish(&message(&s.e, &s.ns, MessageType::Publish, 50, "t", 1, b""));
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_destroy_client_removes_everything() {
        let s = setup(4);
        let c = s.tm.new_client();
        for (id, topic) in [(1, "a"), (2, "b"), (3, "c/*")] {
            s.tm
                .subscribe(c, &message(&s.e, &s.ns, MessageType::Subscribe, id, topic, 0, b""))
                .unwrap();
        }
        assert_eq!(s.tm.subscription_count(), 3);
        s.tm.destroy_client(c);
        assert_eq!(s.tm.subscription_count(), 0);
    }

    #[test]
    fn test_persist_query_and_list() {
        let s = setup(4);
        s.tm
            .persist(&message(&s.e, &s.ns, MessageType::Persist, 1, "home/kitchen/temp", 0, b"20"))
            .unwrap();
        s.tm
            .persist(&message(&s.e, &s.ns, MessageType::Persist, 2, "home/kitchen/temp", 0, b"21"))
            .unwrap();
        s.tm
            .persist(&message(&s.e, &s.ns, MessageType::Persist, 3, "home/hall/light", 0, b"on"))
            .unwrap();

        let q = s
            .tm
            .query(&message(&s.e, &s.ns, MessageType::Query, 4, "home/+/temp", 0, b""))
            .unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].msgid(), 2);

        let all = s
            .tm
            .query(&message(&s.e, &s.ns, MessageType::Query, 5, "home/*", 0, b""))
            .unwrap();
        assert_eq!(all.len(), 2);

        let children = s
            .tm
            .list(&message(&s.e, &s.ns, MessageType::List, 6, "home", 0, b""))
            .unwrap();
        assert_eq!(children, vec!["home/hall".to_string(), "home/kitchen".to_string()]);
    }

    #[test]
    fn test_publish_message_cannot_subscribe() {
        let s = setup(4);
        let c = s.tm.new_client();
        let err = s
            .tm
            .subscribe(c, &message(&s.e, &s.ns, MessageType::Publish, 1, "t", 0, b""))
            .unwrap_err();
        assert_eq!(err.code, StatusCode::BadOperation);
    }
}
