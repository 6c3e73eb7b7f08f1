//! Dial scheduler: static/dynamic peer pools, concurrency caps, and the
//! dial-history suppression cache (§4.4.1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use dep2p_core::{Address, NodeId};
use dep2p_transport::{BoxedConnection, Transport};

use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::path_health::PathHealthManager;

/// A peer the scheduler should try to keep a connection to.
#[derive(Debug, Clone)]
pub struct StaticPeer {
    pub node_id: NodeId,
    pub addresses: Vec<Address>,
}

struct HistoryEntry {
    expires_at: Instant,
}

/// Tracks when each peer was last dialed so repeated dynamic dials are
/// suppressed within `DialHistoryExpiration`.
#[derive(Default)]
struct DialHistory {
    entries: HashMap<NodeId, HistoryEntry>,
}

impl DialHistory {
    fn record(&mut self, peer: NodeId, ttl: Duration) {
        self.entries.insert(peer, HistoryEntry { expires_at: Instant::now() + ttl });
    }

    fn is_suppressed(&self, peer: &NodeId) -> bool {
        self.entries.get(peer).is_some_and(|e| e.expires_at > Instant::now())
    }

    fn reap(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }
}

/// Outcome of one dial attempt, reported back to the scheduler's caller.
pub struct DialOutcome {
    pub peer: NodeId,
    pub result: Result<BoxedConnection, SwarmError>,
    pub address: Address,
    pub rtt: Duration,
}

/// Drives dialing for one [`Transport`]: a static pool the scheduler
/// strives to keep connected, a dynamic channel of on-demand candidates,
/// and the concurrency/history bookkeeping from §4.4.1.
pub struct DialScheduler<T: Transport> {
    transport: Arc<T>,
    cfg: SwarmConfig,
    paths: Arc<PathHealthManager>,
    static_peers: Mutex<Vec<StaticPeer>>,
    history: Mutex<DialHistory>,
    dynamic_tx: mpsc::UnboundedSender<StaticPeer>,
    dynamic_rx: Mutex<mpsc::UnboundedReceiver<StaticPeer>>,
    connected_count: AtomicUsize,
    in_flight: AtomicUsize,
    outcome_tx: mpsc::UnboundedSender<DialOutcome>,
}

impl<T: Transport + 'static> DialScheduler<T> {
    pub fn new(
        transport: Arc<T>,
        cfg: SwarmConfig,
        paths: Arc<PathHealthManager>,
        static_peers: Vec<StaticPeer>,
        outcome_tx: mpsc::UnboundedSender<DialOutcome>,
    ) -> Self {
        let (dynamic_tx, dynamic_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            cfg,
            paths,
            static_peers: Mutex::new(static_peers),
            history: Mutex::new(DialHistory::default()),
            dynamic_tx,
            dynamic_rx: Mutex::new(dynamic_rx),
            connected_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            outcome_tx,
        }
    }

    /// Queues a peer learned from discovery/application code for an
    /// on-demand dial, subject to concurrency caps and dial history.
    pub fn queue_dynamic(&self, peer: StaticPeer) {
        let _ = self.dynamic_tx.send(peer);
    }

    pub fn note_connected(&self) {
        self.connected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_disconnected(&self) {
        self.connected_count.fetch_sub(1, Ordering::Relaxed);
    }

    fn free_slots(&self) -> usize {
        self.cfg.free_dial_slots(
            self.connected_count.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    #[instrument(skip(self, candidate))]
    async fn dial_one(self: &Arc<Self>, candidate: StaticPeer) {
        let ranked = self.paths.rank_addrs(candidate.node_id, &candidate.addresses);
        let address = match ranked.into_iter().next().or_else(|| candidate.addresses.first().cloned()) {
            Some(a) => a,
            None => {
                warn!(peer = %candidate.node_id, "no addresses to dial");
                return;
            }
        };

        self.in_flight.fetch_add(1, Ordering::Relaxed);
        self.history.lock().record(candidate.node_id, self.cfg.dial_history_expiration);

        let started = Instant::now();
        let dial = tokio::time::timeout(self.cfg.dial_timeout, self.transport.dial(&address, candidate.node_id));
        let outcome = match dial.await {
            Ok(Ok(conn)) => {
                let rtt = started.elapsed();
                self.paths.record_success(candidate.node_id, &address, rtt);
                self.note_connected();
                DialOutcome { peer: candidate.node_id, result: Ok(conn), address, rtt }
            }
            Ok(Err(e)) => {
                self.paths.record_failure(candidate.node_id, &address);
                DialOutcome { peer: candidate.node_id, result: Err(e.into()), address, rtt: started.elapsed() }
            }
            Err(_) => {
                self.paths.record_failure(candidate.node_id, &address);
                DialOutcome {
                    peer: candidate.node_id,
                    result: Err(SwarmError::Transport(dep2p_transport::TransportError::Timeout)),
                    address,
                    rtt: started.elapsed(),
                }
            }
        };
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        let _ = self.outcome_tx.send(outcome);
    }

    /// Runs the 1-second scheduling loop: reaps history, drains dynamic
    /// candidates up to the free-slot count, and pulls static candidates
    /// for peers not currently connected.
    pub fn spawn(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("dial scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }

    async fn tick(self: &Arc<Self>) {
        self.history.lock().reap();

        let mut slots = self.free_slots();
        if slots == 0 {
            return;
        }

        while slots > 0 {
            let next = self.dynamic_rx.lock().try_recv().ok();
            let Some(candidate) = next else { break };
            if self.history.lock().is_suppressed(&candidate.node_id) {
                continue;
            }
            let this = Arc::clone(self);
            tokio::spawn(async move { this.dial_one(candidate).await });
            slots -= 1;
        }

        if slots == 0 {
            return;
        }
        for peer in self.static_peers.lock().clone() {
            if slots == 0 {
                break;
            }
            if self.history.lock().is_suppressed(&peer.node_id) {
                continue;
            }
            let this = Arc::clone(self);
            tokio::spawn(async move { this.dial_one(peer).await });
            slots -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_dial_slots_matches_formula() {
        let cfg = SwarmConfig::default();
        assert_eq!(cfg.free_dial_slots(0, 0), 16);
        assert_eq!(cfg.free_dial_slots(48, 0), 4);
        assert_eq!(cfg.free_dial_slots(48, 3), 1);
        assert_eq!(cfg.free_dial_slots(50, 0), 0);
    }

    #[test]
    fn history_suppresses_within_ttl() {
        let mut history = DialHistory::default();
        let peer = NodeId::from_bytes([1u8; 32]);
        assert!(!history.is_suppressed(&peer));
        history.record(peer, Duration::from_secs(30));
        assert!(history.is_suppressed(&peer));
    }
}
