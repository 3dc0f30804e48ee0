//! Subscriptions and their dispatch queues.
//!
//! Each subscription owns a bounded broadcast channel with a single
//! receiver. When the receiver falls behind, the oldest queued messages are
//! overwritten, so a slow consumer never blocks a publisher.

use bw_01_objects::{Message, UniqueMessageId};
use shared_types::Vk;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Terminus-local identity of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug)]
pub struct Subscription {
    pub umid: UniqueMessageId,
    pub client: ClientId,
    pub mvk: Vk,
    /// Suffix pattern after restriction by the authorising chain.
    pub pattern: String,
    pub cells: Vec<String>,
    pub tap: bool,
    pub(crate) queue: broadcast::Sender<Arc<Message>>,
}

impl Subscription {
    pub fn matches(&self, mvk: &Vk, topic_cells: &[&str]) -> bool {
        if &self.mvk != mvk {
            return false;
        }
        let pattern: Vec<&str> = self.cells.iter().map(String::as_str).collect();
        shared_types::topic_match(topic_cells, &pattern)
    }
}

/// Result of a subscribe. A duplicate returns the existing handle and no
/// new stream; the original stream keeps delivering.
#[derive(Debug)]
pub struct SubscribeOutcome {
    pub umid: UniqueMessageId,
    pub duplicate: bool,
    pub stream: Option<SubscriptionStream>,
}

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct SubscriptionStream {
    umid: UniqueMessageId,
    rx: broadcast::Receiver<Arc<Message>>,
    dropped: u64,
}

impl SubscriptionStream {
    pub(crate) fn new(umid: UniqueMessageId, rx: broadcast::Receiver<Arc<Message>>) -> Self {
        Self {
            umid,
            rx,
            dropped: 0,
        }
    }

    pub fn umid(&self) -> UniqueMessageId {
        self.umid
    }

    /// Next message in publish order. `None` once the subscription has been
    /// cancelled and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        loop {
            match self.rx.recv().await {
                Ok(m) => return Some(m),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    debug!(handle = %self.umid, dropped = n, "slow subscriber, dropped oldest messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Messages lost to queue overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
