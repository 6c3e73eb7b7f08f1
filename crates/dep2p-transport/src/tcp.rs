//! TCP fallback transport: raw TCP, then a TLS security upgrade, then
//! Yamux multiplexing. Used when a peer's addresses don't offer a
//! `udp/quic-v1` pair the QUIC transport can dial.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use yamux::{Config as YamuxConfig, Connection as YamuxConnection, ConnectionError, Mode};

use dep2p_core::{Address, AddressComponent, NodeId};

use crate::connection::{BoxedConnection, BoxedStream, Connection, ConnectionStats};
use crate::error::{TransportError, TransportResult};
use crate::tls::{build_rustls_configs, generate_node_identity_cert, remote_node_id_from_cert};
use crate::transport::{BoxedListener, Listener, Transport, DEFAULT_DIAL_TIMEOUT};

fn socket_addr_of(address: &Address) -> TransportResult<SocketAddr> {
    let mut ip = None;
    let mut port = None;
    let mut is_tcp = false;
    for c in address.components() {
        match c {
            AddressComponent::Ip4(v) => ip = Some(std::net::IpAddr::V4(*v)),
            AddressComponent::Ip6(v) => ip = Some(std::net::IpAddr::V6(*v)),
            AddressComponent::Tcp(p) => {
                port = Some(*p);
                is_tcp = true;
            }
            _ => {}
        }
    }
    match (ip, port, is_tcp) {
        (Some(ip), Some(port), true) => Ok(SocketAddr::new(ip, port)),
        _ => Err(TransportError::UnsupportedAddress(address.render())),
    }
}

/// Either side of the TLS upgrade, erased behind one concrete type so
/// the Yamux connection doesn't need to be generic over it.
enum UpgradedIo {
    Server(tokio_rustls::server::TlsStream<TcpStream>),
    Client(tokio_rustls::client::TlsStream<TcpStream>),
}

impl tokio::io::AsyncRead for UpgradedIo {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            UpgradedIo::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            UpgradedIo::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for UpgradedIo {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            UpgradedIo::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            UpgradedIo::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            UpgradedIo::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
            UpgradedIo::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            UpgradedIo::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            UpgradedIo::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A TCP connection after the TLS handshake and Yamux negotiation have
/// both completed, upgraded to the unified [`Connection`] contract.
pub struct TcpConnection {
    remote_node_id: NodeId,
    mux: AsyncMutex<YamuxConnection<UpgradedIo>>,
    streams_opened: AtomicU64,
    streams_accepted: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

#[async_trait]
impl Connection for TcpConnection {
    fn remote_node_id(&self) -> NodeId {
        self.remote_node_id
    }

    async fn open_stream(&self) -> TransportResult<BoxedStream> {
        use futures::future::poll_fn;
        let mut mux = self.mux.lock().await;
        let stream = poll_fn(|cx| mux.poll_new_outbound(cx))
            .await
            .map_err(mux_err)?;
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(stream))
    }

    async fn accept_stream(&self) -> TransportResult<BoxedStream> {
        use futures::future::poll_fn;
        let mut mux = self.mux.lock().await;
        let stream = poll_fn(|cx| mux.poll_next_inbound(cx))
            .await
            .ok_or(TransportError::StreamClosed)?
            .map_err(mux_err)?;
        self.streams_accepted.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        use futures::future::poll_fn;
        let mut mux = self.mux.lock().await;
        let _ = poll_fn(|cx| mux.poll_close(cx)).await;
    }

    fn streams(&self) -> usize {
        (self.streams_opened.load(Ordering::SeqCst) + self.streams_accepted.load(Ordering::SeqCst))
            as usize
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
            streams_opened: self.streams_opened.load(Ordering::SeqCst),
            streams_accepted: self.streams_accepted.load(Ordering::SeqCst),
        }
    }
}

fn mux_err(e: ConnectionError) -> TransportError {
    TransportError::Multiplexer(e.to_string())
}

async fn upgrade_server(
    stream: TcpStream,
    acceptor: &TlsAcceptor,
) -> TransportResult<(NodeId, UpgradedIo)> {
    let tls = acceptor
        .accept(stream)
        .await
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    let remote_node_id = {
        let (_, session) = tls.get_ref();
        let certs = session
            .peer_certificates()
            .ok_or_else(|| TransportError::HandshakeFailed("no client certificate presented".into()))?;
        let leaf = certs
            .first()
            .ok_or_else(|| TransportError::HandshakeFailed("empty client certificate chain".into()))?;
        remote_node_id_from_cert(leaf)?
    };
    Ok((remote_node_id, UpgradedIo::Server(tls)))
}

async fn upgrade_client(
    stream: TcpStream,
    connector: &TlsConnector,
    expected_node_id: NodeId,
) -> TransportResult<UpgradedIo> {
    let server_name = rustls::pki_types::ServerName::try_from("dep2p")
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    let remote_node_id = {
        let (_, session) = tls.get_ref();
        let certs = session
            .peer_certificates()
            .ok_or_else(|| TransportError::HandshakeFailed("no server certificate presented".into()))?;
        let leaf = certs
            .first()
            .ok_or_else(|| TransportError::HandshakeFailed("empty server certificate chain".into()))?;
        remote_node_id_from_cert(leaf)?
    };
    if remote_node_id != expected_node_id {
        return Err(TransportError::HandshakeFailed(format!(
            "peer presented {remote_node_id} but {expected_node_id} was expected"
        )));
    }
    Ok(UpgradedIo::Client(tls))
}

pub struct TcpListener {
    inner: TokioTcpListener,
    acceptor: TlsAcceptor,
    local: Address,
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> TransportResult<BoxedConnection> {
        let (stream, _) = self.inner.accept().await.map_err(TransportError::Io)?;
        let (remote_node_id, io) = upgrade_server(stream, &self.acceptor).await?;
        let mux = YamuxConnection::new(io, YamuxConfig::default(), Mode::Server);
        Ok(Arc::new(TcpConnection {
            remote_node_id,
            mux: AsyncMutex::new(mux),
            streams_opened: AtomicU64::new(0),
            streams_accepted: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }))
    }

    fn local_address(&self) -> Address {
        self.local.clone()
    }

    async fn close(&self) {}
}

/// TCP transport bound to one local NodeID identity certificate.
pub struct TcpTransport {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
}

impl TcpTransport {
    pub fn new(node_id: NodeId) -> TransportResult<Self> {
        let identity = generate_node_identity_cert(node_id)?;
        let (rustls_client, rustls_server) = build_rustls_configs(&identity)?;
        Ok(Self {
            acceptor: TlsAcceptor::from(rustls_server),
            connector: TlsConnector::from(rustls_client),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self, local: &Address) -> TransportResult<BoxedListener> {
        let addr = socket_addr_of(local)?;
        let inner = TokioTcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                source: e.to_string(),
            })?;
        let bound = inner.local_addr().map_err(TransportError::Io)?;
        Ok(Box::new(TcpListener {
            inner,
            acceptor: self.acceptor.clone(),
            local: rebuild_address(local, bound.port()),
        }))
    }

    async fn dial(&self, remote: &Address, remote_node_id: NodeId) -> TransportResult<BoxedConnection> {
        let addr = socket_addr_of(remote)?;
        let stream = tokio::time::timeout(DEFAULT_DIAL_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Io)?;
        let io = upgrade_client(stream, &self.connector, remote_node_id).await?;
        let mux = YamuxConnection::new(io, YamuxConfig::default(), Mode::Client);
        Ok(Arc::new(TcpConnection {
            remote_node_id,
            mux: AsyncMutex::new(mux),
            streams_opened: AtomicU64::new(0),
            streams_accepted: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }))
    }

    fn can_dial(&self, address: &Address) -> bool {
        socket_addr_of(address).is_ok()
    }
}

fn rebuild_address(template: &Address, bound_port: u16) -> Address {
    let components = template
        .components()
        .iter()
        .map(|c| match c {
            AddressComponent::Tcp(_) => AddressComponent::Tcp(bound_port),
            other => other.clone(),
        })
        .collect();
    Address::new(components)
}
