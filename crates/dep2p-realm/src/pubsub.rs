//! Topic-based PubSub (§4.5.4): lazy topic join, bounded per-topic
//! duplicate-suppression cache, gossip fan-out to current topic peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use dep2p_core::NodeId;

use crate::config::PubSubConfig;
use crate::error::{RealmError, RealmResult};

/// One published message, handed to subscribers of a topic.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub topic: String,
    pub sender: NodeId,
    pub sequence: u64,
    pub data: Vec<u8>,
}

struct SeenEntry {
    seen_at: Instant,
}

struct Topic {
    peers: DashSet<NodeId>,
    seen: DashMap<(NodeId, u64), SeenEntry>,
    tx: broadcast::Sender<PubSubMessage>,
}

impl Topic {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { peers: DashSet::new(), seen: DashMap::new(), tx }
    }

    /// Evicts cache entries older than `ttl`, then enforces `max_entries`
    /// by dropping the oldest if still over budget.
    fn reap(&self, ttl: Duration, max_entries: usize) {
        let now = Instant::now();
        self.seen.retain(|_, entry| now.duration_since(entry.seen_at) < ttl);
        if self.seen.len() > max_entries {
            let mut by_age: Vec<((NodeId, u64), Instant)> =
                self.seen.iter().map(|e| (*e.key(), e.value().seen_at)).collect();
            by_age.sort_by_key(|(_, seen_at)| *seen_at);
            for (key, _) in by_age.into_iter().take(self.seen.len() - max_entries) {
                self.seen.remove(&key);
            }
        }
    }
}

/// Local view of Realm-scoped PubSub. Delivery to remote topic peers is
/// left to the Swarm/Messaging wire path a caller wires in; this type
/// owns topic membership, dedup, and local subscriber fan-out.
pub struct PubSub {
    cfg: PubSubConfig,
    topics: DashMap<String, Arc<Topic>>,
    sequences: DashMap<String, AtomicU64>,
    reap_lock: Mutex<()>,
}

impl PubSub {
    pub fn new(cfg: PubSubConfig) -> Self {
        Self { cfg, topics: DashMap::new(), sequences: DashMap::new(), reap_lock: Mutex::new(()) }
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        Arc::clone(self.topics.entry(name.to_string()).or_insert_with(|| Arc::new(Topic::new())))
    }

    /// Joins `topic` lazily, returning a receiver of unique messages.
    pub fn subscribe(&self, topic: &str) -> RealmResult<broadcast::Receiver<PubSubMessage>> {
        if !self.cfg.enable {
            return Err(RealmError::NotJoined);
        }
        Ok(self.topic(topic).tx.subscribe())
    }

    /// Records `peer` as reachable over `topic`, joined via gossip.
    pub fn add_peer(&self, topic: &str, peer: NodeId) {
        self.topic(topic).peers.insert(peer);
    }

    pub fn remove_peer(&self, topic: &str, peer: &NodeId) {
        if let Some(t) = self.topics.get(topic) {
            t.peers.remove(peer);
        }
    }

    pub fn peers(&self, topic: &str) -> Vec<NodeId> {
        self.topics.get(topic).map(|t| t.peers.iter().map(|p| *p).collect()).unwrap_or_default()
    }

    /// Assigns the next per-sender sequence number for a locally
    /// originated publish on `topic`.
    pub fn next_sequence(&self, topic: &str) -> u64 {
        self.sequences.entry(topic.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::SeqCst)
    }

    /// Delivers an inbound (or locally originated) message to local
    /// subscribers exactly once within the cache window, returning
    /// whether it was newly seen (and therefore worth gossiping onward).
    pub fn deliver(&self, topic: &str, sender: NodeId, sequence: u64, data: Vec<u8>) -> bool {
        let t = self.topic(topic);
        let _guard = self.reap_lock.lock();
        t.reap(self.cfg.message_cache_ttl, self.cfg.message_cache_size);
        drop(_guard);

        let key = (sender, sequence);
        if t.seen.contains_key(&key) {
            trace!(topic, sender = %sender, sequence, "duplicate pubsub message suppressed");
            return false;
        }
        t.seen.insert(key, SeenEntry { seen_at: Instant::now() });

        let message = PubSubMessage { topic: topic.to_string(), sender, sequence, data };
        let _ = t.tx.send(message);
        debug!(topic, sender = %sender, sequence, "pubsub message delivered");
        true
    }
}
