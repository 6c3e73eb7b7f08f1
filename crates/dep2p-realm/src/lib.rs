//! # dep2p-realm
//!
//! The protocol layer built on top of [`dep2p_swarm::Swarm`]: Realm
//! membership and lifecycle ([`realm`]), the RealmAuth PSK handshake
//! ([`auth`]), per-stream protocol negotiation ([`negotiate`]), the
//! protobuf wire envelope Messaging uses ([`wire`]), and the four
//! protocol services a joined Realm exposes: request/response
//! [`messaging`], topic [`pubsub`], raw [`streams`], and peer
//! [`liveness`].
//!
//! [`Realm`] ties these together: it owns one [`realm::RealmManager`]
//! and dispatches every inbound stream, after protocol negotiation, to
//! RealmAuth or to whichever service's handler registry claims the
//! negotiated protocol id.

pub mod auth;
pub mod config;
pub mod error;
pub mod liveness;
pub mod messaging;
pub mod negotiate;
pub mod peerstore;
pub mod pubsub;
pub mod realm;
pub mod streams;
pub mod wire;

pub use config::RealmConfig;
pub use error::{RealmError, RealmResult};
pub use messaging::{MessageHandler, Messaging};
pub use peerstore::Peerstore;
pub use pubsub::{PubSub, PubSubMessage};
pub use realm::{RealmEvent, RealmManager, RealmState};
pub use streams::{StreamHandler, Streams};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{instrument, warn};

use dep2p_core::{NodeId, ProtocolId, RealmId};
use dep2p_resource::{Limit, ResourceManager, ScopeId, ScopeKind};
use dep2p_swarm::Swarm;
use dep2p_transport::{BoxedStream, Transport};

/// Bundles Realm membership with the four protocol services it exposes,
/// and routes every accepted stream to the right one after negotiation.
pub struct Realm<T: Transport> {
    node_id: NodeId,
    manager: Arc<RealmManager>,
    swarm: Arc<Swarm<T>>,
    resources: Arc<ResourceManager>,
    peerstore: Arc<Peerstore>,
    messaging: Arc<Messaging<T>>,
    pubsub: Arc<PubSub>,
    streams: Arc<Streams<T>>,
    liveness: Arc<liveness::LivenessService<T>>,
    peer_scopes: DashMap<NodeId, ScopeId>,
}

impl<T: Transport + 'static> Realm<T> {
    pub fn new(node_id: NodeId, swarm: Arc<Swarm<T>>, resources: Arc<ResourceManager>, cfg: RealmConfig) -> Self {
        let manager = Arc::new(RealmManager::new());
        let peerstore = Arc::new(Peerstore::new());
        let messaging = Arc::new(Messaging::new(
            node_id,
            Arc::clone(&swarm),
            Arc::clone(&resources),
            Arc::clone(&manager),
            Arc::clone(&peerstore),
            cfg.messaging.clone(),
        ));
        let pubsub = Arc::new(PubSub::new(cfg.pubsub.clone()));
        let streams = Arc::new(Streams::new(Arc::clone(&swarm), Arc::clone(&resources), Arc::clone(&peerstore)));
        let liveness = Arc::new(liveness::LivenessService::new(
            Arc::clone(&swarm),
            Arc::clone(&resources),
            Arc::clone(&peerstore),
            cfg.liveness.clone(),
        ));
        Self { node_id, manager, swarm, resources, peerstore, messaging, pubsub, streams, liveness, peer_scopes: DashMap::new() }
    }

    pub fn manager(&self) -> &Arc<RealmManager> {
        &self.manager
    }

    pub fn messaging(&self) -> &Arc<Messaging<T>> {
        &self.messaging
    }

    pub fn pubsub(&self) -> &Arc<PubSub> {
        &self.pubsub
    }

    pub fn streams(&self) -> &Arc<Streams<T>> {
        &self.streams
    }

    pub fn liveness(&self) -> &Arc<liveness::LivenessService<T>> {
        &self.liveness
    }

    pub fn peerstore(&self) -> &Arc<Peerstore> {
        &self.peerstore
    }

    /// Joins the Realm gated by `key_material`, starting Messaging and
    /// the Liveness expiry loop (§4.5.2).
    pub fn join(&self, key_material: &str) -> RealmResult<RealmId> {
        let realm_id = self.manager.join(key_material)?;
        self.messaging.start();
        self.liveness.spawn_expiry_loop();
        Ok(realm_id)
    }

    /// Leaves the current Realm: best-effort goodbye to current members,
    /// then unregisters services and clears membership (§4.5.2).
    pub async fn leave(&self) -> RealmResult<()> {
        if let Err(e) = self.liveness.close_node("leaving realm").await {
            warn!(error = %e, "goodbye send failed while leaving realm");
        }
        self.messaging.stop();
        self.liveness.shutdown();
        self.manager.leave()
    }

    fn peer_scope(&self, peer: NodeId) -> RealmResult<ScopeId> {
        if let Some(scope) = self.peer_scopes.get(&peer) {
            return Ok(*scope);
        }
        let scope = self.resources.create_child_scope(
            self.resources.system_scope(),
            ScopeKind::Peer,
            format!("peer:{}", peer.to_base58()),
            Limit::UNLIMITED,
        )?;
        self.peer_scopes.insert(peer, scope);
        Ok(scope)
    }

    /// Entry point for an accepted inbound stream: reads the protocol
    /// negotiation header and routes to RealmAuth, a system Liveness
    /// protocol, or a registered Messaging/Streams handler.
    #[instrument(skip(self, stream))]
    pub async fn handle_inbound_stream(&self, from: NodeId, mut stream: BoxedStream) -> RealmResult<()> {
        let protocol = negotiate::read_header(&mut stream).await?;

        if protocol == realm_auth_protocol() {
            let key = self.manager.key()?;
            auth::authenticate_inbound(&mut stream, &key, &config::AuthConfig::default()).await?;
            if let Some(realm_id) = self.manager.realm_id() {
                self.manager.record_member(realm_id, from);
                if let Ok(scope) = self.peer_scope(from) {
                    self.swarm.promote_to_peer(from, scope)?;
                }
            }
            return Ok(());
        }

        if protocol == liveness::ping_protocol() {
            return liveness::respond_ping(&mut stream).await;
        }

        if protocol == liveness::goodbye_protocol() {
            let reason = liveness::read_goodbye_body(&mut stream).await?;
            self.liveness.record_remote_goodbye(from);
            warn!(peer = %from, reason, "received goodbye");
            return Ok(());
        }

        if !self.is_app_protocol_for_current_realm(&protocol) {
            return Err(RealmError::NotRealmMember);
        }
        if !self.manager.realm_id().is_some_and(|id| self.manager.is_member(id, &from)) {
            return Err(RealmError::NotRealmMember);
        }

        match self.messaging.handle_inbound(&protocol, from, &mut stream).await {
            Ok(()) => Ok(()),
            Err(RealmError::NoHandler) => self.streams.dispatch(&protocol, from, stream).await,
            Err(e) => Err(e),
        }
    }

    fn is_app_protocol_for_current_realm(&self, protocol: &ProtocolId) -> bool {
        match (protocol.realm_id(), self.manager.realm_id()) {
            (Some(p), Some(c)) => p == c,
            _ => false,
        }
    }
}

pub fn realm_auth_protocol() -> ProtocolId {
    ProtocolId::system("realm-auth", "1.0.0").expect("well-formed system protocol id")
}
