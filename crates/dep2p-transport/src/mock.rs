//! In-memory transport used by higher-layer tests (`dep2p-swarm`,
//! `dep2p-realm`) so the Swarm and Realm services can be exercised
//! without opening real sockets. Two [`MockTransport`] handles created
//! from the same [`MockNetwork`] can dial each other; everything else
//! behaves like a real [`Transport`]: `dial` against an address nobody
//! is listening on fails with [`TransportError::Unreachable`], and each
//! [`MockConnection`] multiplexes streams over in-memory channels, one
//! pair of channels per opened stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, Mutex};

use dep2p_core::{Address, NodeId};

use crate::connection::{BoxedConnection, BoxedStream, Connection, ConnectionStats};
use crate::error::{TransportError, TransportResult};
use crate::transport::{BoxedListener, Listener, Transport, DEFAULT_DIAL_TIMEOUT};

struct DuplexEnd {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    pending: Mutex<Vec<u8>>,
}

fn duplex_pair() -> (DuplexEnd, DuplexEnd) {
    let (tx1, rx1) = mpsc::unbounded_channel();
    let (tx2, rx2) = mpsc::unbounded_channel();
    (
        DuplexEnd { tx: tx1, rx: Mutex::new(rx2), pending: Mutex::new(Vec::new()) },
        DuplexEnd { tx: tx2, rx: Mutex::new(rx1), pending: Mutex::new(Vec::new()) },
    )
}

/// One half of an in-memory duplex byte stream.
pub struct MockStream(Arc<DuplexEnd>);

impl AsyncRead for MockStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let mut pending = self.0.pending.try_lock().expect("single-task test reader");
        if pending.is_empty() {
            let mut rx = self.0.rx.try_lock().expect("single-task test reader");
            match rx.poll_recv(cx) {
                std::task::Poll::Ready(Some(chunk)) => *pending = chunk,
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
        let n = pending.len().min(buf.remaining());
        buf.put_slice(&pending[..n]);
        pending.drain(..n);
        std::task::Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let _ = self.0.tx.send(buf.to_vec());
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

impl Unpin for MockStream {}

/// One end of an in-memory connection pair; the other end lives on the
/// peer's [`MockTransport`].
pub struct MockConnection {
    remote: NodeId,
    peer_inbound: mpsc::UnboundedSender<Arc<DuplexEnd>>,
    my_inbound: Mutex<mpsc::UnboundedReceiver<Arc<DuplexEnd>>>,
    streams_opened: AtomicU64,
    streams_accepted: AtomicU64,
    open_streams: AtomicU64,
}

fn connected_pair(dialer: NodeId, acceptor: NodeId) -> (MockConnection, MockConnection) {
    let (dialer_to_acceptor, acceptor_rx) = mpsc::unbounded_channel::<Arc<DuplexEnd>>();
    let (acceptor_to_dialer, dialer_rx) = mpsc::unbounded_channel::<Arc<DuplexEnd>>();
    let dialer_side = MockConnection {
        remote: acceptor,
        peer_inbound: dialer_to_acceptor,
        my_inbound: Mutex::new(dialer_rx),
        streams_opened: AtomicU64::new(0),
        streams_accepted: AtomicU64::new(0),
        open_streams: AtomicU64::new(0),
    };
    let acceptor_side = MockConnection {
        remote: dialer,
        peer_inbound: acceptor_to_dialer,
        my_inbound: Mutex::new(acceptor_rx),
        streams_opened: AtomicU64::new(0),
        streams_accepted: AtomicU64::new(0),
        open_streams: AtomicU64::new(0),
    };
    (dialer_side, acceptor_side)
}

#[async_trait]
impl Connection for MockConnection {
    fn remote_node_id(&self) -> NodeId {
        self.remote
    }

    async fn open_stream(&self) -> TransportResult<BoxedStream> {
        let (mine, theirs) = duplex_pair();
        self.peer_inbound
            .send(Arc::new(theirs))
            .map_err(|_| TransportError::StreamClosed)?;
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        self.open_streams.fetch_add(1, Ordering::Relaxed);
        Ok(Box::pin(MockStream(Arc::new(mine))))
    }

    async fn accept_stream(&self) -> TransportResult<BoxedStream> {
        let mut rx = self.my_inbound.lock().await;
        let end = rx.recv().await.ok_or(TransportError::StreamClosed)?;
        self.streams_accepted.fetch_add(1, Ordering::Relaxed);
        self.open_streams.fetch_add(1, Ordering::Relaxed);
        Ok(Box::pin(MockStream(end)))
    }

    async fn close(&self) {}

    fn streams(&self) -> usize {
        self.open_streams.load(Ordering::Relaxed) as usize
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: 0,
            bytes_received: 0,
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_accepted: self.streams_accepted.load(Ordering::Relaxed),
        }
    }
}

struct Registration {
    accept_tx: mpsc::UnboundedSender<MockConnection>,
}

/// Shared registry every [`MockTransport`] dials/listens through. Tests
/// create one `MockNetwork` and hand each simulated node its own
/// `MockTransport::new(network.clone(), node_id)`.
#[derive(Clone, Default)]
pub struct MockNetwork {
    listeners: Arc<Mutex<HashMap<Address, Registration>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MockListener {
    local: Address,
    accept_rx: Mutex<mpsc::UnboundedReceiver<MockConnection>>,
    network: MockNetwork,
}

#[async_trait]
impl Listener for MockListener {
    async fn accept(&self) -> TransportResult<BoxedConnection> {
        let mut rx = self.accept_rx.lock().await;
        let conn = rx.recv().await.ok_or(TransportError::StreamClosed)?;
        Ok(Arc::new(conn))
    }

    fn local_address(&self) -> Address {
        self.local.clone()
    }

    async fn close(&self) {
        self.network.listeners.lock().await.remove(&self.local);
    }
}

/// An in-memory [`Transport`]. `dial` only succeeds against an address
/// currently `listen`ing on the same [`MockNetwork`].
pub struct MockTransport {
    network: MockNetwork,
    node_id: NodeId,
}

impl MockTransport {
    pub fn new(network: MockNetwork, node_id: NodeId) -> Self {
        Self { network, node_id }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen(&self, local: &Address) -> TransportResult<BoxedListener> {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        self.network
            .listeners
            .lock()
            .await
            .insert(local.clone(), Registration { accept_tx });
        Ok(Box::new(MockListener {
            local: local.clone(),
            accept_rx: Mutex::new(accept_rx),
            network: self.network.clone(),
        }))
    }

    async fn dial(&self, remote: &Address, remote_node_id: NodeId) -> TransportResult<BoxedConnection> {
        let accept_tx = {
            let guard = self.network.listeners.lock().await;
            guard
                .get(remote)
                .map(|reg| reg.accept_tx.clone())
                .ok_or_else(|| TransportError::Unreachable(remote.render()))?
        };
        let (dialer_side, acceptor_side) = connected_pair(self.node_id, remote_node_id);
        tokio::time::timeout(DEFAULT_DIAL_TIMEOUT, async {
            accept_tx
                .send(acceptor_side)
                .map_err(|_| TransportError::Refused("listener closed".into()))
        })
        .await
        .map_err(|_| TransportError::Timeout)??;
        Ok(Arc::new(dialer_side))
    }

    fn can_dial(&self, _address: &Address) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep2p_core::AddressComponent;

    fn addr(port: u16) -> Address {
        Address::new(vec![
            AddressComponent::Ip4(std::net::Ipv4Addr::LOCALHOST),
            AddressComponent::Udp(port),
            AddressComponent::QuicV1,
        ])
    }

    #[tokio::test]
    async fn dial_unreachable_address_fails() {
        let network = MockNetwork::new();
        let t = MockTransport::new(network, NodeId::from_bytes([1u8; 32]));
        let err = t.dial(&addr(9), NodeId::from_bytes([2u8; 32])).await;
        assert!(matches!(err, Err(TransportError::Unreachable(_))));
    }

    #[tokio::test]
    async fn echo_over_mock_stream() {
        let network = MockNetwork::new();
        let a_id = NodeId::from_bytes([1u8; 32]);
        let b_id = NodeId::from_bytes([2u8; 32]);
        let a = MockTransport::new(network.clone(), a_id);
        let b = MockTransport::new(network, b_id);

        let listener = b.listen(&addr(1)).await.unwrap();
        let accept_task = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let mut stream = conn.accept_stream().await.unwrap();
            let mut buf = [0u8; 5];
            tokio::io::AsyncReadExt::read_exact(&mut stream, &mut buf).await.unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut stream, &buf).await.unwrap();
        });

        let conn = a.dial(&addr(1), b_id).await.unwrap();
        assert_eq!(conn.remote_node_id(), b_id);
        let mut stream = conn.open_stream().await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut stream, &mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        accept_task.await.unwrap();
    }
}
