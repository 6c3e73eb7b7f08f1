//! Per-peer / per-protocol byte counters and periodic rollup reporting
//! (§4.5, bandwidth accounting paragraph).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::info;

use dep2p_core::{NodeId, ProtocolId};

#[derive(Default)]
struct Counter {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

struct PeerCounters {
    total: Counter,
    by_protocol: DashMap<ProtocolId, Counter>,
    last_activity: parking_lot::Mutex<Instant>,
}

impl PeerCounters {
    fn new(now: Instant) -> Self {
        Self {
            total: Counter::default(),
            by_protocol: DashMap::new(),
            last_activity: parking_lot::Mutex::new(now),
        }
    }
}

/// A point-in-time total/in/out snapshot, either for one peer or one
/// protocol, used when building a rollup report.
#[derive(Debug, Clone)]
pub struct BandwidthSnapshot {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Full rollup emitted on [`BandwidthTracker::rollup`].
#[derive(Debug, Clone)]
pub struct BandwidthReport {
    pub total_in: u64,
    pub total_out: u64,
    pub top_peers: Vec<(NodeId, BandwidthSnapshot)>,
    pub top_protocols: Vec<(ProtocolId, BandwidthSnapshot)>,
}

/// Tracks bytes transferred per peer and per protocol, and periodically
/// reports a rollup while trimming peers idle past `IdleTimeout`.
pub struct BandwidthTracker {
    peers: DashMap<NodeId, Arc<PeerCounters>>,
    idle_timeout: Duration,
    top_n: usize,
}

impl BandwidthTracker {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { peers: DashMap::new(), idle_timeout, top_n: 5 }
    }

    fn entry(&self, peer: NodeId) -> Arc<PeerCounters> {
        Arc::clone(
            &self
                .peers
                .entry(peer)
                .or_insert_with(|| Arc::new(PeerCounters::new(Instant::now()))),
        )
    }

    pub fn record_out(&self, peer: NodeId, protocol: &ProtocolId, bytes: u64) {
        let counters = self.entry(peer);
        counters.total.bytes_out.fetch_add(bytes, Ordering::Relaxed);
        counters
            .by_protocol
            .entry(protocol.clone())
            .or_default()
            .bytes_out
            .fetch_add(bytes, Ordering::Relaxed);
        *counters.last_activity.lock() = Instant::now();
    }

    pub fn record_in(&self, peer: NodeId, protocol: &ProtocolId, bytes: u64) {
        let counters = self.entry(peer);
        counters.total.bytes_in.fetch_add(bytes, Ordering::Relaxed);
        counters
            .by_protocol
            .entry(protocol.clone())
            .or_default()
            .bytes_in
            .fetch_add(bytes, Ordering::Relaxed);
        *counters.last_activity.lock() = Instant::now();
    }

    /// Builds a rollup of current totals, top-N peers and protocols by
    /// total bytes, and trims peers idle past `idle_timeout`.
    pub fn rollup(&self) -> BandwidthReport {
        let now = Instant::now();
        self.peers.retain(|_, c| now.duration_since(*c.last_activity.lock()) < self.idle_timeout);

        let mut total_in = 0u64;
        let mut total_out = 0u64;
        let mut by_peer = Vec::new();
        let mut protocol_totals: HashMap<ProtocolId, BandwidthSnapshot> = HashMap::new();

        for entry in self.peers.iter() {
            let peer = *entry.key();
            let counters = entry.value();
            let bytes_in = counters.total.bytes_in.load(Ordering::Relaxed);
            let bytes_out = counters.total.bytes_out.load(Ordering::Relaxed);
            total_in += bytes_in;
            total_out += bytes_out;
            by_peer.push((peer, BandwidthSnapshot { bytes_in, bytes_out }));

            for proto_entry in counters.by_protocol.iter() {
                let snap = protocol_totals
                    .entry(proto_entry.key().clone())
                    .or_insert(BandwidthSnapshot { bytes_in: 0, bytes_out: 0 });
                snap.bytes_in += proto_entry.bytes_in.load(Ordering::Relaxed);
                snap.bytes_out += proto_entry.bytes_out.load(Ordering::Relaxed);
            }
        }

        by_peer.sort_by(|a, b| (b.1.bytes_in + b.1.bytes_out).cmp(&(a.1.bytes_in + a.1.bytes_out)));
        by_peer.truncate(self.top_n);

        let mut by_protocol: Vec<_> = protocol_totals.into_iter().collect();
        by_protocol.sort_by(|a, b| (b.1.bytes_in + b.1.bytes_out).cmp(&(a.1.bytes_in + a.1.bytes_out)));
        by_protocol.truncate(self.top_n);

        BandwidthReport { total_in, total_out, top_peers: by_peer, top_protocols: by_protocol }
    }

    /// Spawns the periodic rollup loop; emits one `tracing` event per tick.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown_rx: tokio::sync::mpsc::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let report = self.rollup();
                        info!(
                            total_in = report.total_in,
                            total_out = report.total_out,
                            peers = report.top_peers.len(),
                            "bandwidth rollup"
                        );
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    #[test]
    fn rollup_totals_sum_across_peers() {
        let tracker = BandwidthTracker::new(Duration::from_secs(600));
        let proto = ProtocolId::system("echo", "1.0.0").unwrap();
        tracker.record_out(peer(1), &proto, 100);
        tracker.record_in(peer(1), &proto, 50);
        tracker.record_out(peer(2), &proto, 10);

        let report = tracker.rollup();
        assert_eq!(report.total_out, 110);
        assert_eq!(report.total_in, 50);
        assert_eq!(report.top_peers[0].0, peer(1));
    }

    #[test]
    fn idle_peers_are_trimmed() {
        let tracker = BandwidthTracker::new(Duration::from_millis(1));
        let proto = ProtocolId::system("echo", "1.0.0").unwrap();
        tracker.record_out(peer(1), &proto, 1);
        std::thread::sleep(Duration::from_millis(5));
        let report = tracker.rollup();
        assert!(report.top_peers.is_empty());
    }
}
