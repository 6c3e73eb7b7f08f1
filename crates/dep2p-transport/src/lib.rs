//! # dep2p-transport
//!
//! QUIC-primary, TCP-fallback transport layer (§4.2). Both transports
//! expose the same [`Transport`]/[`Connection`] contract once a raw
//! socket has been upgraded: a security handshake establishes the
//! remote [`NodeId`](dep2p_core::NodeId), and on TCP a Yamux
//! negotiation adds the multiplexing QUIC gets natively.
//!
//! - [`quic`]: the primary transport, one `quinn` connection per peer.
//! - [`tcp`]: the fallback transport: TCP + TLS 1.3 + Yamux.
//! - [`tls`]: the self-signed-certificate security upgrade shared by
//!   both transports.
//! - [`mock`]: an in-memory transport used by higher-layer tests so the
//!   Swarm and Realm services can be exercised without real sockets.

pub mod connection;
pub mod error;
pub mod mock;
pub mod quic;
pub mod tcp;
pub mod tls;
pub mod transport;

pub use connection::{BoxedConnection, BoxedStream, Connection, ConnectionStats, Stream};
pub use error::{TransportError, TransportResult};
pub use quic::QuicTransport;
pub use tcp::TcpTransport;
pub use transport::{BoxedListener, Listener, Transport, DEFAULT_DIAL_TIMEOUT};
