//! # dep2p-swarm
//!
//! Connection lifecycle on top of a [`dep2p_transport::Transport`]: the
//! dial scheduler ([`dial_scheduler`]) decides who and when to dial, the
//! path-health manager ([`path_health`]) tracks per-address RTT/loss and
//! ranks candidates, and [`Swarm`] ties both to the
//! [`dep2p_resource::ResourceManager`] so every live connection is backed
//! by a Peer scope.
//!
//! A freshly dialed or accepted connection is first accounted against the
//! Transient scope; once it is confirmed to belong to a known peer (after
//! RealmAuth, at the Realm layer above this crate) its usage is moved to
//! a per-peer scope via [`dep2p_resource::ResourceManager::reparent`].

pub mod bandwidth;
pub mod config;
pub mod dial_scheduler;
pub mod error;
pub mod path_health;

pub use bandwidth::{BandwidthReport, BandwidthSnapshot, BandwidthTracker};
pub use config::SwarmConfig;
pub use dial_scheduler::{DialOutcome, DialScheduler, StaticPeer};
pub use error::{SwarmError, SwarmResult};
pub use path_health::{PathHealthManager, PathId, PathState, PathType};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument};

use dep2p_core::{Address, NodeId};
use dep2p_resource::{Limit, Priority, ResourceManager, ScopeId, ScopeKind};
use dep2p_transport::{BoxedConnection, Transport};

/// One connection's resource accounting: which scope it is accounted
/// under, and whether that scope is still Transient or has been promoted
/// to a Peer scope.
struct TrackedConnection {
    conn: BoxedConnection,
    scope: ScopeId,
}

/// Ties dialing, path health, and resource accounting together for one
/// [`Transport`]. Does not itself speak any application protocol; Realm
/// services are built on top of the connections it hands out.
pub struct Swarm<T: Transport> {
    transport: Arc<T>,
    resources: Arc<ResourceManager>,
    paths: Arc<PathHealthManager>,
    bandwidth: Arc<BandwidthTracker>,
    connections: DashMap<NodeId, TrackedConnection>,
}

impl<T: Transport + 'static> Swarm<T> {
    pub fn new(transport: Arc<T>, resources: Arc<ResourceManager>, cfg: SwarmConfig) -> Self {
        let idle_timeout = cfg.bandwidth_idle_timeout;
        Self {
            transport,
            resources,
            paths: Arc::new(PathHealthManager::new(cfg)),
            bandwidth: Arc::new(BandwidthTracker::new(idle_timeout)),
            connections: DashMap::new(),
        }
    }

    pub fn path_health(&self) -> &Arc<PathHealthManager> {
        &self.paths
    }

    pub fn bandwidth(&self) -> &Arc<BandwidthTracker> {
        &self.bandwidth
    }

    /// Returns the already-open connection to `peer`, if any.
    pub fn connection(&self, peer: NodeId) -> Option<BoxedConnection> {
        self.connections.get(&peer).map(|c| c.conn.clone())
    }

    /// Get-or-dial: reuses a live connection if one exists, otherwise
    /// reserves an outbound connection slot under `parent_scope`, dials
    /// the best-ranked address, and accounts the new connection there.
    #[instrument(skip(self, addresses))]
    pub async fn get_or_dial(
        &self,
        peer: NodeId,
        addresses: &[Address],
        parent_scope: ScopeId,
        priority: Priority,
    ) -> SwarmResult<BoxedConnection> {
        if let Some(existing) = self.connection(peer) {
            return Ok(existing);
        }

        let ranked = self.paths.rank_addrs(peer, addresses);
        let address = ranked
            .into_iter()
            .next()
            .or_else(|| addresses.first().cloned())
            .ok_or(SwarmError::NoAddresses)?;

        let scope = self.resources.create_child_scope(
            parent_scope,
            ScopeKind::Connection,
            format!("conn:{}", peer.to_base58()),
            Limit::UNLIMITED,
        )?;
        if let Err(e) = self.resources.reserve_conn_outbound(scope, priority) {
            self.resources.close(scope).ok();
            return Err(e.into());
        }

        let started = std::time::Instant::now();
        let conn = match self.transport.dial(&address, peer).await {
            Ok(conn) => {
                self.paths.record_success(peer, &address, started.elapsed());
                conn
            }
            Err(e) => {
                self.paths.record_failure(peer, &address);
                self.resources.release_conn_outbound(scope).ok();
                self.resources.close(scope).ok();
                return Err(e.into());
            }
        };

        self.connections.insert(peer, TrackedConnection { conn: conn.clone(), scope });
        Ok(conn)
    }

    /// Records a connection dialed elsewhere (e.g. by a
    /// [`dial_scheduler::DialScheduler`] maintaining the static peer
    /// pool) against `parent_scope`, enforcing the outbound connection
    /// cap. Does nothing to the connection itself; call this once the
    /// dial has already succeeded.
    pub fn register_dialed(
        &self,
        conn: BoxedConnection,
        parent_scope: ScopeId,
        priority: Priority,
    ) -> SwarmResult<()> {
        let peer = conn.remote_node_id();
        let scope = self.resources.create_child_scope(
            parent_scope,
            ScopeKind::Connection,
            format!("conn:{}", peer.to_base58()),
            Limit::UNLIMITED,
        )?;
        if let Err(e) = self.resources.reserve_conn_outbound(scope, priority) {
            self.resources.close(scope).ok();
            return Err(e.into());
        }
        self.connections.insert(peer, TrackedConnection { conn, scope });
        Ok(())
    }

    /// Records an inbound connection accepted elsewhere (e.g. a listener
    /// loop) against `parent_scope`, enforcing the inbound connection cap.
    pub fn accept(
        &self,
        conn: BoxedConnection,
        parent_scope: ScopeId,
        priority: Priority,
    ) -> SwarmResult<()> {
        let peer = conn.remote_node_id();
        let scope = self.resources.create_child_scope(
            parent_scope,
            ScopeKind::Connection,
            format!("conn:{}", peer.to_base58()),
            Limit::UNLIMITED,
        )?;
        if let Err(e) = self.resources.reserve_conn_inbound(scope, priority) {
            self.resources.close(scope).ok();
            return Err(e.into());
        }
        self.connections.insert(peer, TrackedConnection { conn, scope });
        Ok(())
    }

    /// Moves a connection's accounted usage from its current (typically
    /// Transient-rooted) scope chain to a Peer scope, once the peer has
    /// authenticated into a Realm.
    pub fn promote_to_peer(&self, peer: NodeId, peer_scope: ScopeId) -> SwarmResult<()> {
        if let Some(tracked) = self.connections.get(&peer) {
            self.resources.reparent(tracked.scope, peer_scope)?;
        }
        Ok(())
    }

    /// Closes and forgets a connection, releasing its resource scope.
    pub fn disconnect(&self, peer: NodeId) {
        if let Some((_, tracked)) = self.connections.remove(&peer) {
            debug!(peer = %peer, "disconnecting");
            self.resources.close(tracked.scope).ok();
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Peers with a live tracked connection, for broadcast operations
    /// like sending goodbye to every open connection on shutdown.
    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }
}
