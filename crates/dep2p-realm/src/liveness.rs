//! Peer liveness (§4.5.6): ping/pong RTT tracking, health score decay and
//! recovery, status transitions, and the goodbye protocol.
//!
//! The peer map and the status-change callback list are deliberately two
//! separate locks (§5's locking discipline): callbacks are copied out
//! under their own lock and invoked only after both locks are released,
//! so a callback can safely call back into this service without
//! deadlocking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use dep2p_core::{NodeId, ProtocolId};
use dep2p_resource::{Priority, ResourceManager};
use dep2p_swarm::Swarm;
use dep2p_transport::{BoxedConnection, BoxedStream, Transport};

use crate::config::LivenessConfig;
use crate::error::{RealmError, RealmResult};
use crate::negotiate;
use crate::peerstore::Peerstore;

pub fn ping_protocol() -> ProtocolId {
    ProtocolId::system("ping", "1.0.0").expect("well-formed system protocol id")
}

pub fn goodbye_protocol() -> ProtocolId {
    ProtocolId::system("goodbye", "1.0.0").expect("well-formed system protocol id")
}

const PING_LEN: usize = 32;
const GOODBYE_MAX_REASON: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Unknown,
    Online,
    Degraded,
    Offline,
}

#[derive(Debug, Clone)]
struct PeerState {
    status: PeerStatus,
    avg_rtt: Option<Duration>,
    last_ping_rtt: Option<Duration>,
    last_seen: Instant,
    failed_pings: u32,
    health_score: u32,
}

impl PeerState {
    fn new() -> Self {
        Self { status: PeerStatus::Unknown, avg_rtt: None, last_ping_rtt: None, last_seen: Instant::now(), failed_pings: 0, health_score: 100 }
    }
}

type Callback = Arc<dyn Fn(NodeId, PeerStatus, PeerStatus) + Send + Sync>;

pub struct LivenessService<T: Transport> {
    swarm: Arc<Swarm<T>>,
    resources: Arc<ResourceManager>,
    peerstore: Arc<Peerstore>,
    cfg: LivenessConfig,
    peers: RwLock<HashMap<NodeId, PeerState>>,
    callbacks: RwLock<Vec<Callback>>,
    heartbeats: DashMap<NodeId, JoinHandle<()>>,
}

impl<T: Transport + 'static> LivenessService<T> {
    pub fn new(swarm: Arc<Swarm<T>>, resources: Arc<ResourceManager>, peerstore: Arc<Peerstore>, cfg: LivenessConfig) -> Self {
        Self { swarm, resources, peerstore, cfg, peers: RwLock::new(HashMap::new()), callbacks: RwLock::new(Vec::new()), heartbeats: DashMap::new() }
    }

    pub fn on_status_change(&self, callback: Callback) {
        self.callbacks.write().push(callback);
    }

    pub fn status(&self, peer: &NodeId) -> PeerStatus {
        self.peers.read().get(peer).map(|s| s.status).unwrap_or(PeerStatus::Unknown)
    }

    pub fn avg_rtt(&self, peer: &NodeId) -> Option<Duration> {
        self.peers.read().get(peer).and_then(|s| s.avg_rtt)
    }

    /// Get-or-dial `peer`, open a ping stream, exchange 32 random bytes,
    /// and update its liveness record from the measured RTT.
    #[instrument(skip(self))]
    pub async fn ping(&self, peer: NodeId) -> RealmResult<Duration> {
        let result = self.try_ping(peer).await;
        match result {
            Ok(rtt) => {
                self.record_success(peer, rtt);
                Ok(rtt)
            }
            Err(e) => {
                self.record_failure(peer);
                Err(e)
            }
        }
    }

    async fn try_ping(&self, peer: NodeId) -> RealmResult<Duration> {
        let addresses = self.peerstore.addresses(&peer);
        let conn = self.swarm.get_or_dial(peer, &addresses, self.resources.system_scope(), Priority::Medium).await?;

        tokio::time::timeout(self.cfg.heartbeat_timeout, async {
            let mut stream = conn.open_stream().await.map_err(RealmError::from)?;
            negotiate::write_header(&mut stream, &ping_protocol()).await?;

            let mut sent = [0u8; PING_LEN];
            rand::thread_rng().fill_bytes(&mut sent);
            let started = Instant::now();
            stream.write_all(&sent).await.map_err(|e| RealmError::Codec(e.to_string()))?;

            let mut echoed = [0u8; PING_LEN];
            stream.read_exact(&mut echoed).await.map_err(|e| RealmError::Codec(e.to_string()))?;
            if echoed != sent {
                return Err(RealmError::Codec("ping echo mismatch".into()));
            }
            Ok(started.elapsed())
        })
        .await
        .map_err(|_| RealmError::Timeout)?
    }

    fn record_success(&self, peer: NodeId, rtt: Duration) {
        let (old, new) = {
            let mut peers = self.peers.write();
            let state = peers.entry(peer).or_insert_with(PeerState::new);
            let old = state.status;

            state.avg_rtt = Some(match state.avg_rtt {
                Some(avg) => ewma(avg, rtt, self.cfg.rtt_ewma_alpha),
                None => rtt,
            });
            state.last_ping_rtt = Some(rtt);
            state.last_seen = Instant::now();
            state.failed_pings = 0;
            state.status = if rtt < self.cfg.degraded_rtt_threshold { PeerStatus::Online } else { PeerStatus::Degraded };
            state.health_score = (state.health_score + self.cfg.health_score.recovery_on_ping).min(100);

            (old, state.status)
        };
        self.notify_if_changed(peer, old, new);
    }

    fn record_failure(&self, peer: NodeId) {
        let (old, new) = {
            let mut peers = self.peers.write();
            let state = peers.entry(peer).or_insert_with(PeerState::new);
            let old = state.status;

            state.failed_pings += 1;
            state.status = if state.failed_pings >= self.cfg.max_failed_pings_before_offline { PeerStatus::Offline } else { PeerStatus::Degraded };
            state.health_score = state.health_score.saturating_sub(self.cfg.health_score.decay_amount).max(self.cfg.health_score.min_score);

            (old, state.status)
        };
        self.notify_if_changed(peer, old, new);
    }

    /// Records activity on `peer` outside of a ping (e.g. a successful
    /// data send), granting the smaller data-driven health recovery.
    pub fn record_data_activity(&self, peer: NodeId) {
        let mut peers = self.peers.write();
        let state = peers.entry(peer).or_insert_with(PeerState::new);
        state.last_seen = Instant::now();
        state.health_score = (state.health_score + self.cfg.health_score.recovery_on_data).min(100);
    }

    fn notify_if_changed(&self, peer: NodeId, old: PeerStatus, new: PeerStatus) {
        if old == new {
            return;
        }
        let callbacks = self.callbacks.read().clone();
        for cb in callbacks {
            cb(peer, old, new);
        }
    }

    /// Starts a per-peer heartbeat loop pinging at `HeartbeatInterval`.
    /// A second call for the same peer replaces the previous loop.
    pub fn start_heartbeat(self: &Arc<Self>, peer: NodeId) {
        self.stop_heartbeat(&peer);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.cfg.heartbeat_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = this.ping(peer).await {
                    warn!(peer = %peer, error = %e, "heartbeat ping failed");
                }
            }
        });
        self.heartbeats.insert(peer, handle);
    }

    pub fn stop_heartbeat(&self, peer: &NodeId) {
        if let Some((_, handle)) = self.heartbeats.remove(peer) {
            handle.abort();
        }
    }

    /// Cancels every running heartbeat loop.
    pub fn shutdown(&self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
        self.heartbeats.clear();
    }

    /// Deletes peer records that have been Offline for longer than
    /// `StatusExpiry`, emitting an `Offline -> Unknown` transition for
    /// each after releasing the peer-map lock. Intended to run on a
    /// 1-minute ticker.
    pub fn reap_expired(&self) {
        let now = Instant::now();
        let expired: Vec<NodeId> = {
            let mut peers = self.peers.write();
            let expired: Vec<NodeId> = peers
                .iter()
                .filter(|(_, s)| s.status == PeerStatus::Offline && now.duration_since(s.last_seen) > self.cfg.status_expiry)
                .map(|(peer, _)| *peer)
                .collect();
            for peer in &expired {
                peers.remove(peer);
            }
            expired
        };
        for peer in expired {
            debug!(peer = %peer, "liveness record expired");
            self.notify_if_changed(peer, PeerStatus::Offline, PeerStatus::Unknown);
        }
    }

    /// Spawns the 1-minute expiry ticker; aborts on drop of the handle.
    pub fn spawn_expiry_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                this.reap_expired();
            }
        })
    }

    /// Writes `reason` as a goodbye to every open connection concurrently,
    /// then marks each as locally Offline.
    #[instrument(skip(self))]
    pub async fn close_node(&self, reason: &str) -> RealmResult<()> {
        if reason.len() > GOODBYE_MAX_REASON {
            return Err(RealmError::GoodbyeTooLong);
        }
        let peers = self.swarm.connected_peers();
        let sends = peers.iter().map(|peer| {
            let conn = self.swarm.connection(*peer);
            async move {
                if let Some(conn) = conn {
                    let _ = send_goodbye(&conn, reason).await;
                }
            }
        });
        futures::future::join_all(sends).await;

        for peer in peers {
            self.record_remote_goodbye(peer);
        }
        info!(reason, "sent goodbye to all connections");
        tokio::time::sleep(self.cfg.goodbye_wait).await;
        Ok(())
    }

    /// Marks `peer` locally Offline in response to a received goodbye,
    /// emitting the corresponding status-change event.
    pub fn record_remote_goodbye(&self, peer: NodeId) {
        let old = {
            let mut peers = self.peers.write();
            let state = peers.entry(peer).or_insert_with(PeerState::new);
            let old = state.status;
            state.status = PeerStatus::Offline;
            old
        };
        self.notify_if_changed(peer, old, PeerStatus::Offline);
    }
}

fn ewma(avg: Duration, sample: Duration, alpha: f64) -> Duration {
    let avg_ms = avg.as_secs_f64() * 1000.0;
    let sample_ms = sample.as_secs_f64() * 1000.0;
    Duration::from_secs_f64((avg_ms * (1.0 - alpha) + sample_ms * alpha) / 1000.0)
}

/// Writes a goodbye (`uint16-be` length + UTF-8 reason) on a fresh stream
/// of `conn`.
pub async fn send_goodbye(conn: &BoxedConnection, reason: &str) -> RealmResult<()> {
    if reason.len() > GOODBYE_MAX_REASON {
        return Err(RealmError::GoodbyeTooLong);
    }
    let mut stream = conn.open_stream().await.map_err(RealmError::from)?;
    negotiate::write_header(&mut stream, &goodbye_protocol()).await?;
    write_goodbye_body(&mut stream, reason).await
}

async fn write_goodbye_body(stream: &mut BoxedStream, reason: &str) -> RealmResult<()> {
    let bytes = reason.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| RealmError::GoodbyeTooLong)?;
    stream.write_all(&len.to_be_bytes()).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    stream.write_all(bytes).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    Ok(())
}

/// Reads a goodbye body off an accepted stream (after protocol
/// negotiation), returning the sender's reason.
pub async fn read_goodbye_body(stream: &mut BoxedStream) -> RealmResult<String> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len > GOODBYE_MAX_REASON {
        return Err(RealmError::GoodbyeTooLong);
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| RealmError::Codec(e.to_string()))
}

/// Responds to an inbound ping stream (after protocol negotiation) by
/// echoing back exactly the bytes received.
pub async fn respond_ping(stream: &mut BoxedStream) -> RealmResult<()> {
    let mut buf = [0u8; PING_LEN];
    stream.read_exact(&mut buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    stream.write_all(&buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use dep2p_core::{Address, AddressComponent};
    use dep2p_resource::Limit;
    use dep2p_swarm::SwarmConfig;
    use dep2p_transport::mock::{MockNetwork, MockTransport};

    fn addr(port: u16) -> Address {
        Address::new(vec![AddressComponent::Ip4(Ipv4Addr::LOCALHOST), AddressComponent::Udp(port), AddressComponent::QuicV1])
    }

    fn service(network: MockNetwork, id: NodeId) -> Arc<LivenessService<MockTransport>> {
        let transport = Arc::new(MockTransport::new(network, id));
        let resources = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
        let swarm = Arc::new(Swarm::new(transport, resources.clone(), SwarmConfig::default()));
        Arc::new(LivenessService::new(swarm, resources, Arc::new(Peerstore::new()), LivenessConfig::default()))
    }

    #[tokio::test]
    async fn three_pings_match_scenario_s5_ewma() {
        let network = MockNetwork::new();
        let server_id = NodeId::from_bytes([1u8; 32]);
        let client_id = NodeId::from_bytes([2u8; 32]);

        let server_transport = Arc::new(MockTransport::new(network.clone(), server_id));
        let listener = server_transport.listen(&addr(1)).await.unwrap();
        let server = tokio::spawn(async move {
            for _ in 0..3 {
                let conn = listener.accept().await.unwrap();
                let mut stream = conn.accept_stream().await.unwrap();
                negotiate::read_header(&mut stream).await.unwrap();
                respond_ping(&mut stream).await.unwrap();
            }
        });

        let client = service(network, client_id);
        client.peerstore.add_address(server_id, addr(1));

        for _ in 0..3 {
            client.ping(server_id).await.unwrap();
        }
        server.await.unwrap();

        assert_eq!(client.status(&server_id), PeerStatus::Online);
        let peers = client.peers.read();
        assert_eq!(peers.get(&server_id).unwrap().failed_pings, 0);
    }

    #[test]
    fn ewma_matches_three_ping_scenario() {
        let mut avg = Duration::from_millis(10);
        avg = ewma(avg, Duration::from_millis(20), 0.2);
        assert_eq!(avg.as_millis(), 12);
        avg = ewma(avg, Duration::from_millis(30), 0.2);
        assert!((avg.as_secs_f64() * 1000.0 - 15.6).abs() < 0.01);
    }

    #[test]
    fn three_consecutive_failures_go_offline() {
        let network = MockNetwork::new();
        let service = service(network, NodeId::from_bytes([9u8; 32]));
        let peer = NodeId::from_bytes([8u8; 32]);
        service.record_failure(peer);
        service.record_failure(peer);
        assert_eq!(service.status(&peer), PeerStatus::Degraded);
        service.record_failure(peer);
        assert_eq!(service.status(&peer), PeerStatus::Offline);
    }

    #[test]
    fn status_change_callbacks_fire_without_holding_any_lock() {
        let network = MockNetwork::new();
        let service = service(network, NodeId::from_bytes([9u8; 32]));
        let peer = NodeId::from_bytes([7u8; 32]);
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        service.on_status_change(Arc::new(move |_peer, _old, _new| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        service.record_failure(peer);
        service.record_failure(peer);
        service.record_failure(peer);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reap_expired_emits_offline_to_unknown() {
        let network = MockNetwork::new();
        let service = service(network, NodeId::from_bytes([9u8; 32]));
        let peer = NodeId::from_bytes([6u8; 32]);
        service.record_remote_goodbye(peer);
        {
            let mut peers = service.peers.write();
            let state = peers.get_mut(&peer).unwrap();
            state.last_seen = Instant::now() - Duration::from_secs(600);
        }
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        service.on_status_change(Arc::new(move |_peer, old, new| {
            if old == PeerStatus::Offline && new == PeerStatus::Unknown {
                calls2.fetch_add(1, Ordering::SeqCst);
            }
        }));
        service.reap_expired();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(service.peers.read().get(&peer).is_none());
    }
}
