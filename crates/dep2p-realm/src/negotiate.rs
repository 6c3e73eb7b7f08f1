//! Per-stream protocol negotiation (§4.4.3: "`open_stream`/`accept_stream`
//! producing per-stream protocol IDs"). Every stream begins with its
//! protocol id as a `uint16-be` length followed by UTF-8 bytes, the same
//! framing idiom the Goodbye wire protocol uses for its reason string.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use dep2p_core::ProtocolId;
use dep2p_transport::BoxedStream;

use crate::error::{RealmError, RealmResult};

pub async fn write_header(stream: &mut BoxedStream, protocol: &ProtocolId) -> RealmResult<()> {
    let bytes = protocol.as_str().as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| RealmError::Codec("protocol id too long".into()))?;
    stream.write_all(&len.to_be_bytes()).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    stream.write_all(bytes).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    Ok(())
}

pub async fn read_header(stream: &mut BoxedStream) -> RealmResult<ProtocolId> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    let s = String::from_utf8(buf).map_err(|e| RealmError::Codec(e.to_string()))?;
    ProtocolId::parse(&s).map_err(RealmError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use dep2p_core::{Address, AddressComponent, NodeId};
    use dep2p_transport::mock::{MockNetwork, MockTransport};
    use dep2p_transport::Transport;

    fn addr(port: u16) -> Address {
        Address::new(vec![
            AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
            AddressComponent::Udp(port),
            AddressComponent::QuicV1,
        ])
    }

    #[tokio::test]
    async fn header_round_trips_over_a_stream() {
        let network = MockNetwork::new();
        let a = NodeId::from_bytes([1u8; 32]);
        let b = NodeId::from_bytes([2u8; 32]);
        let b_t = Arc::new(MockTransport::new(network.clone(), b));
        let listener = b_t.listen(&addr(1)).await.unwrap();
        let expected = ProtocolId::system("ping", "1.0.0").unwrap();
        let expected2 = expected.clone();

        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let mut stream = conn.accept_stream().await.unwrap();
            read_header(&mut stream).await.unwrap()
        });

        let a_t = Arc::new(MockTransport::new(network, a));
        let conn = a_t.dial(&addr(1), b).await.unwrap();
        let mut stream = conn.open_stream().await.unwrap();
        write_header(&mut stream, &expected2).await.unwrap();

        assert_eq!(server.await.unwrap(), expected);
    }
}
