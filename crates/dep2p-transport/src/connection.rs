//! The unified connection contract both transports expose after upgrade.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use dep2p_core::NodeId;

use crate::error::TransportResult;

/// A single bidirectional, ordered byte stream multiplexed over a
/// [`Connection`]. Read/write ordering within one stream is FIFO; there
/// is no ordering guarantee between sibling streams.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

pub type BoxedStream = Pin<Box<dyn Stream>>;

/// Snapshot of a connection's lifetime traffic counters, consulted by the
/// bandwidth/introspection rollup and the path-health manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub streams_opened: u64,
    pub streams_accepted: u64,
}

/// A secured, multiplexed transport connection — the result of running
/// the security handshake (and, on TCP, the Yamux negotiation) over a
/// raw dial or inbound socket. QUIC and upgraded-TCP connections both
/// implement this the same way so the Swarm never branches on
/// transport kind.
#[async_trait]
pub trait Connection: Send + Sync {
    /// NodeID established by the security handshake's certificate or
    /// static key, independent of whatever address was dialed.
    fn remote_node_id(&self) -> NodeId;

    /// Open a new outbound stream.
    async fn open_stream(&self) -> TransportResult<BoxedStream>;

    /// Accept the next inbound stream the peer opens.
    async fn accept_stream(&self) -> TransportResult<BoxedStream>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Number of streams currently open on this connection.
    fn streams(&self) -> usize;

    fn stats(&self) -> ConnectionStats;
}

pub type BoxedConnection = std::sync::Arc<dyn Connection>;
