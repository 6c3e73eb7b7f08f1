//! Raw long-lived bidirectional streams (§4.5.5): no framing is imposed,
//! the application owns the byte layout.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use dep2p_core::{NodeId, ProtocolId};
use dep2p_resource::{Priority, ResourceManager};
use dep2p_swarm::Swarm;
use dep2p_transport::{BoxedStream, Transport};

use crate::error::{RealmError, RealmResult};
use crate::negotiate;
use crate::peerstore::Peerstore;

/// Handles an accepted raw stream for one protocol. Takes ownership of
/// the stream; the application reads/writes it directly.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle(&self, from: NodeId, stream: BoxedStream);
}

pub struct Streams<T: Transport> {
    swarm: Arc<Swarm<T>>,
    resources: Arc<ResourceManager>,
    peerstore: Arc<Peerstore>,
    handlers: DashMap<ProtocolId, Arc<dyn StreamHandler>>,
}

impl<T: Transport + 'static> Streams<T> {
    pub fn new(swarm: Arc<Swarm<T>>, resources: Arc<ResourceManager>, peerstore: Arc<Peerstore>) -> Self {
        Self { swarm, resources, peerstore, handlers: DashMap::new() }
    }

    pub fn register_handler(&self, protocol: ProtocolId, handler: Arc<dyn StreamHandler>) -> RealmResult<()> {
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

    /// Opens a fresh stream to `peer` under `protocol`, auto-dialing via
    /// the Peerstore if there is no live connection yet.
    #[instrument(skip(self))]
    pub async fn open(&self, peer: NodeId, protocol: &ProtocolId) -> RealmResult<BoxedStream> {
        let addresses = self.peerstore.addresses(&peer);
        let conn = self.swarm.get_or_dial(peer, &addresses, self.resources.system_scope(), Priority::Medium).await?;
        let mut stream = conn.open_stream().await.map_err(RealmError::from)?;
        negotiate::write_header(&mut stream, protocol).await?;
        Ok(stream)
    }

    /// Dispatches an inbound stream, already past protocol negotiation,
    /// to its registered handler.
    pub async fn dispatch(&self, protocol: &ProtocolId, from: NodeId, stream: BoxedStream) -> RealmResult<()> {
        let handler = self.handlers.get(protocol).ok_or(RealmError::NoHandler)?.clone();
        handler.handle(from, stream).await;
        Ok(())
    }
}
