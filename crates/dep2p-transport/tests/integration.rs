//! Integration tests for dep2p-transport.
//!
//! `echo_over_quic_loopback` exercises the real QUIC transport end to
//! end on loopback (§3 S1); `dial_unreachable_quic_address_times_out`
//! and the mock-transport tests exercise failure/accounting behavior
//! without relying on available UDP ports in CI sandboxes.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use dep2p_core::{Address, AddressComponent, NodeId};
use dep2p_transport::{QuicTransport, Transport};

fn quic_addr(port: u16) -> Address {
    Address::new(vec![
        AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
        AddressComponent::Udp(port),
        AddressComponent::QuicV1,
    ])
}

#[tokio::test]
async fn echo_over_quic_loopback() {
    let server_id = NodeId::from_public_key_bytes(&[0xA1; 32]);
    let client_id = NodeId::from_public_key_bytes(&[0xB2; 32]);

    let server = QuicTransport::new(server_id).expect("server transport");
    let client = QuicTransport::new(client_id).expect("client transport");

    let listener = server.listen(&quic_addr(0)).await.expect("listen");
    let bound = listener.local_address();

    let accept_task = tokio::spawn(async move {
        let conn = listener.accept().await.expect("accept");
        let mut stream = conn.accept_stream().await.expect("accept_stream");
        let mut buf = [0u8; 13];
        stream.read_exact(&mut buf).await.expect("read");
        stream.write_all(&buf).await.expect("write back");
        stream.shutdown().await.ok();
    });

    let conn = client.dial(&bound, server_id).await.expect("dial");
    assert_eq!(conn.remote_node_id(), server_id);

    let mut stream = conn.open_stream().await.expect("open_stream");
    stream.write_all(b"Hello, DeP2P!").await.expect("write");

    let mut echoed = [0u8; 13];
    stream.read_exact(&mut echoed).await.expect("read echo");
    assert_eq!(&echoed, b"Hello, DeP2P!");

    accept_task.await.expect("accept task");
    conn.close().await;
}

#[tokio::test]
async fn dial_unreachable_quic_address_fails() {
    let dialer = QuicTransport::new(NodeId::from_public_key_bytes(&[0xC3; 32])).unwrap();
    let target = NodeId::from_public_key_bytes(&[0xD4; 32]);
    let result = tokio::time::timeout(
        Duration::from_secs(3),
        dialer.dial(&quic_addr(1), target),
    )
    .await
    .expect("dial should not hang past its own timeout");
    assert!(result.is_err());
}

#[tokio::test]
async fn can_dial_recognizes_quic_addresses_only() {
    let t = QuicTransport::new(NodeId::from_public_key_bytes(&[1u8; 32])).unwrap();
    assert!(t.can_dial(&quic_addr(4001)));
    let tcp_only = Address::new(vec![
        AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
        AddressComponent::Tcp(4001),
    ]);
    assert!(!t.can_dial(&tcp_only));
}

mod mock_transport {
    use dep2p_core::NodeId;
    use dep2p_transport::mock::{MockNetwork, MockTransport};
    use dep2p_transport::{Transport, TransportError};

    use super::quic_addr;

    #[tokio::test]
    async fn dial_against_unregistered_address_is_unreachable() {
        let network = MockNetwork::new();
        let t = MockTransport::new(network, NodeId::from_bytes([9u8; 32]));
        let err = t
            .dial(&quic_addr(1), NodeId::from_bytes([10u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
