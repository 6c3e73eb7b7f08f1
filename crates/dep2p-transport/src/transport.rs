//! The transport contract the Swarm dials and listens through.

use std::time::Duration;

use async_trait::async_trait;

use dep2p_core::{Address, NodeId};

use crate::connection::BoxedConnection;
use crate::error::TransportResult;

/// Default dial timeout per §4.2.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces inbound connections accepted on a bound local address.
/// Stops yielding new connections once its parent transport is closed;
/// connections already produced are unaffected.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> TransportResult<BoxedConnection>;

    /// The address this listener actually bound to (useful when the
    /// configured port was 0).
    fn local_address(&self) -> Address;

    async fn close(&self);
}

pub type BoxedListener = Box<dyn Listener>;

/// One of the transport families the Swarm can use: QUIC (primary) or
/// TCP (fallback). Both expose the same shape; a raw connection from
/// either comes back already upgraded to the unified [`Connection`]
/// contract.
///
/// [`Connection`]: crate::connection::Connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind a listener on `local`. Fails if the address family or port
    /// is unavailable.
    async fn listen(&self, local: &Address) -> TransportResult<BoxedListener>;

    /// Dial `remote`, authenticating the peer as `remote_node_id`
    /// during the security handshake.
    async fn dial(&self, remote: &Address, remote_node_id: NodeId) -> TransportResult<BoxedConnection>;

    /// Whether this transport recognizes the component family and
    /// protocol suffix of `address` (e.g. `udp/quic-v1` vs `tcp`).
    fn can_dial(&self, address: &Address) -> bool;
}
