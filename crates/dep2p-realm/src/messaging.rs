//! Request/response Messaging service (§4.5.3): one fresh stream per
//! request, varint+protobuf framed, with bounded retries on transient
//! failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use tracing::{instrument, warn};

use dep2p_core::{NodeId, ProtocolId};
use dep2p_resource::{Priority, ResourceManager};
use dep2p_swarm::Swarm;
use dep2p_transport::Transport;

use crate::config::MessagingConfig;
use crate::error::{RealmError, RealmResult};
use crate::negotiate;
use crate::peerstore::Peerstore;
use crate::realm::RealmManager;
use crate::wire::{self, Message, MessageType};

/// Application handler for one protocol; returns the response payload.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, from: NodeId, payload: Vec<u8>) -> Vec<u8>;
}

pub struct Messaging<T: Transport> {
    node_id: NodeId,
    swarm: Arc<Swarm<T>>,
    resources: Arc<ResourceManager>,
    realm: Arc<RealmManager>,
    peerstore: Arc<Peerstore>,
    cfg: MessagingConfig,
    handlers: DashMap<ProtocolId, Arc<dyn MessageHandler>>,
    started: AtomicBool,
}

impl<T: Transport + 'static> Messaging<T> {
    pub fn new(
        node_id: NodeId,
        swarm: Arc<Swarm<T>>,
        resources: Arc<ResourceManager>,
        realm: Arc<RealmManager>,
        peerstore: Arc<Peerstore>,
        cfg: MessagingConfig,
    ) -> Self {
        Self { node_id, swarm, resources, realm, peerstore, cfg, handlers: DashMap::new(), started: AtomicBool::new(false) }
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Declares a local handler for `protocol`. Rejects a duplicate
    /// registration (§8 property 7).
    pub fn register_handler(&self, protocol: ProtocolId, handler: Arc<dyn MessageHandler>) -> RealmResult<()> {
        match self.handlers.entry(protocol) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RealmError::HandlerAlreadyRegistered),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(handler);
                Ok(())
            }
        }
    }

    pub fn unregister_handler(&self, protocol: &ProtocolId) {
        self.handlers.remove(protocol);
    }

    /// Sends `data` to `peer` under `protocol` and waits for the
    /// response, retrying transient failures up to `MaxRetries` times.
    #[instrument(skip(self, data))]
    pub async fn send(&self, peer: NodeId, protocol: ProtocolId, data: Vec<u8>) -> RealmResult<Vec<u8>> {
        self.preflight(&peer, &protocol)?;

        let mut attempt = 0;
        loop {
            match self.send_once(peer, &protocol, &data).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.cfg.max_retries && e.is_transient() => {
                    attempt += 1;
                    warn!(peer = %peer, attempt, error = %e, "messaging send retrying");
                    tokio::time::sleep(self.cfg.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Same semantics as [`Messaging::send`], returned as a single-shot
    /// channel so the caller can proceed without awaiting inline.
    pub fn send_async(
        self: &Arc<Self>,
        peer: NodeId,
        protocol: ProtocolId,
        data: Vec<u8>,
    ) -> tokio::sync::oneshot::Receiver<RealmResult<Vec<u8>>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.send(peer, protocol, data).await;
            let _ = tx.send(result);
        });
        rx
    }

    fn preflight(&self, peer: &NodeId, protocol: &ProtocolId) -> RealmResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(RealmError::NotJoined);
        }
        if protocol.as_str().is_empty() {
            return Err(RealmError::InvalidProtocol(dep2p_core::error::ProtocolIdError::Empty));
        }
        let member_of_any = self.realm.find_realms_for_peer(peer);
        if member_of_any.is_empty() {
            return Err(RealmError::NotRealmMember);
        }
        Ok(())
    }

    async fn send_once(&self, peer: NodeId, protocol: &ProtocolId, data: &[u8]) -> RealmResult<Vec<u8>> {
        let addresses = self.peerstore.addresses(&peer);
        let conn = self
            .swarm
            .get_or_dial(peer, &addresses, self.resources.system_scope(), Priority::Medium)
            .await?;

        let mut stream = conn.open_stream().await.map_err(RealmError::from)?;
        negotiate::write_header(&mut stream, protocol).await?;

        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        let request = Message {
            id: id.to_vec(),
            from: self.node_id.as_bytes().to_vec(),
            r#type: MessageType::Request as i32,
            priority: 0,
            payload: data.to_vec(),
            timestamp: Message::now_unix(),
            metadata: HashMap::new(),
        };

        tokio::time::timeout(self.cfg.request_timeout, async {
            wire::write_message(&mut stream, &request).await?;
            wire::read_message(&mut stream, self.cfg.max_message_size).await
        })
        .await
        .map_err(|_| RealmError::Timeout)??
        .pipe_payload()
    }

    /// Invoked by the stream-accept loop after RealmAuth and protocol
    /// negotiation: reads the request, dispatches to the registered
    /// handler, and writes back the response.
    pub async fn handle_inbound(&self, protocol: &ProtocolId, from: NodeId, stream: &mut dep2p_transport::BoxedStream) -> RealmResult<()> {
        let handler = self.handlers.get(protocol).ok_or(RealmError::NoHandler)?.clone();
        let request = wire::read_message(stream, self.cfg.max_message_size).await?;
        let payload = handler.handle(from, request.payload).await;

        let response = Message {
            id: request.id,
            from: self.node_id.as_bytes().to_vec(),
            r#type: MessageType::Response as i32,
            priority: request.priority,
            payload,
            timestamp: Message::now_unix(),
            metadata: HashMap::new(),
        };
        wire::write_message(stream, &response).await
    }
}

impl Message {
    /// Extracts the response payload, surfacing a handler-side error
    /// carried in the reserved `error` metadata key.
    fn pipe_payload(self) -> RealmResult<Vec<u8>> {
        if let Some(err) = self.metadata.get(wire::METADATA_ERROR_KEY) {
            return Err(RealmError::Codec(String::from_utf8_lossy(err).into_owned()));
        }
        Ok(self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use dep2p_core::{Address, AddressComponent};
    use dep2p_resource::Limit;
    use dep2p_swarm::SwarmConfig;
    use dep2p_transport::mock::{MockNetwork, MockTransport};

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&self, _from: NodeId, payload: Vec<u8>) -> Vec<u8> {
            payload
        }
    }

    fn addr(port: u16) -> Address {
        Address::new(vec![
            AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
            AddressComponent::Udp(port),
            AddressComponent::QuicV1,
        ])
    }

    #[tokio::test]
    async fn send_round_trips_through_a_registered_handler() {
        let network = MockNetwork::new();
        let a_id = NodeId::from_bytes([1u8; 32]);
        let b_id = NodeId::from_bytes([2u8; 32]);
        let protocol = ProtocolId::system("echo", "1.0.0").unwrap();

        let b_transport = Arc::new(MockTransport::new(network.clone(), b_id));
        let listener = b_transport.listen(&addr(1)).await.unwrap();
        let b_resources = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
        let b_swarm = Arc::new(Swarm::new(b_transport, b_resources.clone(), SwarmConfig::default()));
        let b_realm = Arc::new(RealmManager::new());
        let realm_id = b_realm.join("team-key").unwrap();
        b_realm.record_member(realm_id, a_id);
        let b_messaging = Arc::new(Messaging::new(
            b_id,
            b_swarm,
            b_resources,
            b_realm,
            Arc::new(Peerstore::new()),
            MessagingConfig::default(),
        ));
        b_messaging.start();
        b_messaging.register_handler(protocol.clone(), Arc::new(Echo)).unwrap();

        let server_messaging = Arc::clone(&b_messaging);
        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let mut stream = conn.accept_stream().await.unwrap();
            let protocol = negotiate::read_header(&mut stream).await.unwrap();
            server_messaging.handle_inbound(&protocol, a_id, &mut stream).await.unwrap();
        });

        let a_transport = Arc::new(MockTransport::new(network, a_id));
        let a_resources = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
        let a_swarm = Arc::new(Swarm::new(a_transport, a_resources.clone(), SwarmConfig::default()));
        let a_realm = Arc::new(RealmManager::new());
        a_realm.join("team-key").unwrap();
        let a_peerstore = Arc::new(Peerstore::new());
        a_peerstore.add_address(b_id, addr(1));
        a_realm.record_member(realm_id, b_id);
        let a_messaging = Messaging::new(a_id, a_swarm, a_resources, a_realm, a_peerstore, MessagingConfig::default());
        a_messaging.start();

        let response = a_messaging.send(b_id, protocol, b"hello".to_vec()).await.unwrap();
        assert_eq!(response, b"hello");
        server.await.unwrap();
    }

    #[test]
    fn duplicate_handler_registration_is_rejected() {
        let swarm_cfg = SwarmConfig::default();
        let network = MockNetwork::new();
        let transport = Arc::new(MockTransport::new(network, NodeId::from_bytes([9u8; 32])));
        let resources = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
        let swarm = Arc::new(Swarm::new(transport, resources.clone(), swarm_cfg));
        let messaging = Messaging::new(
            NodeId::from_bytes([9u8; 32]),
            swarm,
            resources,
            Arc::new(RealmManager::new()),
            Arc::new(Peerstore::new()),
            MessagingConfig::default(),
        );
        let protocol = ProtocolId::system("dup", "1.0.0").unwrap();
        messaging.register_handler(protocol.clone(), Arc::new(Echo)).unwrap();
        assert!(matches!(
            messaging.register_handler(protocol, Arc::new(Echo)),
            Err(RealmError::HandlerAlreadyRegistered)
        ));
    }
}
