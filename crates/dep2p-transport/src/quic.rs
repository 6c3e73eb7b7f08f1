//! QUIC transport: the primary transport per §4.2. One `quinn`
//! connection natively multiplexes streams, carries the TLS 1.3
//! identity, and needs no separate multiplexer step.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig};
use tokio::sync::Mutex;

use dep2p_core::{Address, AddressComponent, NodeId};

use crate::connection::{BoxedConnection, BoxedStream, Connection, ConnectionStats};
use crate::error::{TransportError, TransportResult};
use crate::tls::{build_rustls_configs, generate_node_identity_cert, remote_node_id_from_cert};
use crate::transport::{BoxedListener, Listener, Transport, DEFAULT_DIAL_TIMEOUT};

fn socket_addr_of(address: &Address) -> TransportResult<(SocketAddr, bool)> {
    let mut ip = None;
    let mut port = None;
    let mut is_quic = false;
    for c in address.components() {
        match c {
            AddressComponent::Ip4(v) => ip = Some(std::net::IpAddr::V4(*v)),
            AddressComponent::Ip6(v) => ip = Some(std::net::IpAddr::V6(*v)),
            AddressComponent::Udp(p) => port = Some(*p),
            AddressComponent::QuicV1 => is_quic = true,
            _ => {}
        }
    }
    match (ip, port) {
        (Some(ip), Some(port)) if is_quic => Ok((SocketAddr::new(ip, port), is_quic)),
        _ => Err(TransportError::UnsupportedAddress(address.render())),
    }
}

/// A live QUIC connection upgraded to the unified [`Connection`] contract.
pub struct QuicConnection {
    remote_node_id: NodeId,
    inner: quinn::Connection,
    streams_opened: AtomicU64,
    streams_accepted: AtomicU64,
}

#[async_trait]
impl Connection for QuicConnection {
    fn remote_node_id(&self) -> NodeId {
        self.remote_node_id
    }

    async fn open_stream(&self) -> TransportResult<BoxedStream> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| TransportError::Refused(e.to_string()))?;
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(QuicStream { send, recv }))
    }

    async fn accept_stream(&self) -> TransportResult<BoxedStream> {
        let (send, recv) = self
            .inner
            .accept_bi()
            .await
            .map_err(|e| TransportError::Refused(e.to_string()))?;
        self.streams_accepted.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(QuicStream { send, recv }))
    }

    async fn close(&self) {
        self.inner.close(0u32.into(), b"closed");
    }

    fn streams(&self) -> usize {
        (self.streams_opened.load(Ordering::SeqCst) + self.streams_accepted.load(Ordering::SeqCst))
            as usize
    }

    fn stats(&self) -> ConnectionStats {
        let stats = self.inner.stats();
        ConnectionStats {
            bytes_sent: stats.udp_tx.bytes,
            bytes_received: stats.udp_rx.bytes,
            streams_opened: self.streams_opened.load(Ordering::SeqCst),
            streams_accepted: self.streams_accepted.load(Ordering::SeqCst),
        }
    }
}

struct QuicStream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

impl tokio::io::AsyncRead for QuicStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for QuicStream {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.send).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.send).poll_shutdown(cx)
    }
}

pub struct QuicListener {
    endpoint: Endpoint,
    local: Address,
}

#[async_trait]
impl Listener for QuicListener {
    async fn accept(&self) -> TransportResult<BoxedConnection> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| TransportError::Refused("listener closed".into()))?;
        let connection = incoming
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        wrap_connection(connection).map(|c| Arc::new(c) as BoxedConnection)
    }

    fn local_address(&self) -> Address {
        self.local.clone()
    }

    async fn close(&self) {
        self.endpoint.close(0u32.into(), b"closed");
    }
}

fn wrap_connection(connection: quinn::Connection) -> TransportResult<QuicConnection> {
    let identity = connection
        .peer_identity()
        .ok_or_else(|| TransportError::HandshakeFailed("no peer certificate presented".into()))?;
    let certs = identity
        .downcast::<Vec<rustls::pki_types::CertificateDer<'static>>>()
        .map_err(|_| TransportError::HandshakeFailed("unexpected peer identity type".into()))?;
    let leaf = certs
        .first()
        .ok_or_else(|| TransportError::HandshakeFailed("empty peer certificate chain".into()))?;
    let remote_node_id = remote_node_id_from_cert(leaf)?;
    Ok(QuicConnection {
        remote_node_id,
        inner: connection,
        streams_opened: AtomicU64::new(0),
        streams_accepted: AtomicU64::new(0),
    })
}

/// QUIC transport bound to one local NodeID identity certificate.
pub struct QuicTransport {
    endpoint: Mutex<Option<Endpoint>>,
    client_config: ClientConfig,
    server_config: ServerConfig,
}

impl QuicTransport {
    pub fn new(node_id: NodeId) -> TransportResult<Self> {
        let identity = generate_node_identity_cert(node_id)?;
        let (rustls_client, rustls_server) = build_rustls_configs(&identity)?;

        let quic_client = QuicClientConfig::try_from((*rustls_client).clone())
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        let mut client_config = ClientConfig::new(Arc::new(quic_client));
        let mut transport = TransportConfig::default();
        transport.keep_alive_interval(Some(std::time::Duration::from_secs(15)));
        client_config.transport_config(Arc::new(transport));

        let quic_server = QuicServerConfig::try_from((*rustls_server).clone())
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        let server_config = ServerConfig::with_crypto(Arc::new(quic_server));

        Ok(Self {
            endpoint: Mutex::new(None),
            client_config,
            server_config,
        })
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn listen(&self, local: &Address) -> TransportResult<BoxedListener> {
        let (addr, _) = socket_addr_of(local)?;
        let mut endpoint = Endpoint::server(self.server_config.clone(), addr)
            .map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                source: e.to_string(),
            })?;
        endpoint.set_default_client_config(self.client_config.clone());

        let bound_addr = endpoint
            .local_addr()
            .map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                source: e.to_string(),
            })?;

        *self.endpoint.lock().await = Some(endpoint.clone());

        Ok(Box::new(QuicListener {
            endpoint,
            local: rebuild_address(local, bound_addr.port()),
        }))
    }

    async fn dial(&self, remote: &Address, remote_node_id: NodeId) -> TransportResult<BoxedConnection> {
        let (addr, _) = socket_addr_of(remote)?;
        let endpoint = {
            let guard = self.endpoint.lock().await;
            match guard.as_ref() {
                Some(e) => e.clone(),
                None => Endpoint::client("0.0.0.0:0".parse().unwrap())
                    .map_err(|e| TransportError::LocalResourceExhausted(e.to_string()))?,
            }
        };

        let connecting = endpoint
            .connect_with(self.client_config.clone(), addr, "dep2p")
            .map_err(|e| TransportError::Refused(e.to_string()))?;

        let connection = tokio::time::timeout(DEFAULT_DIAL_TIMEOUT, connecting)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        let wrapped = wrap_connection(connection)?;
        if wrapped.remote_node_id != remote_node_id {
            return Err(TransportError::HandshakeFailed(format!(
                "peer presented {} but {} was expected",
                wrapped.remote_node_id, remote_node_id
            )));
        }
        Ok(Arc::new(wrapped))
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
            AddressComponent::Udp(_) => AddressComponent::Udp(bound_port),
            other => other.clone(),
        })
        .collect();
    Address::new(components)
}
