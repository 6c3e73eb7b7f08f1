//! Integration tests for dep2p-swarm: resource-capped connection
//! accounting (§8 S4) and path ranking end to end with a mock transport.

use std::net::Ipv4Addr;
use std::sync::Arc;

use dep2p_core::{Address, AddressComponent, NodeId};
use dep2p_resource::{Limit, Priority, ResourceManager};
use dep2p_swarm::{SwarmConfig, SwarmError};
use dep2p_transport::mock::{MockNetwork, MockTransport};
use dep2p_transport::Transport;

fn addr(port: u16) -> Address {
    Address::new(vec![
        AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
        AddressComponent::Udp(port),
        AddressComponent::QuicV1,
    ])
}

/// §8 S4: `System.Conns=2`, `System.ConnsInbound=1`. First inbound
/// succeeds, second inbound fails, outbound succeeds, a third connection
/// of any kind fails.
#[test]
fn resource_cap_matches_scenario_s4() {
    let system_limit = Limit { conns_total: 2, conns_inbound: 1, ..Limit::UNLIMITED };
    let resources = ResourceManager::new(system_limit, Limit::UNLIMITED);
    let system = resources.system_scope();

    let conn_a = resources
        .create_child_scope(system, dep2p_resource::ScopeKind::Connection, "a", Limit::UNLIMITED)
        .unwrap();
    resources.reserve_conn_inbound(conn_a, Priority::Medium).expect("first inbound succeeds");

    let conn_b = resources
        .create_child_scope(system, dep2p_resource::ScopeKind::Connection, "b", Limit::UNLIMITED)
        .unwrap();
    let second_inbound = resources.reserve_conn_inbound(conn_b, Priority::Medium);
    assert!(second_inbound.is_err(), "second inbound connection must exceed ConnsInbound=1");

    let conn_c = resources
        .create_child_scope(system, dep2p_resource::ScopeKind::Connection, "c", Limit::UNLIMITED)
        .unwrap();
    resources.reserve_conn_outbound(conn_c, Priority::Medium).expect("outbound succeeds, Conns=2 so far");

    let conn_d = resources
        .create_child_scope(system, dep2p_resource::ScopeKind::Connection, "d", Limit::UNLIMITED)
        .unwrap();
    let third_any = resources.reserve_conn_outbound(conn_d, Priority::Medium);
    assert!(third_any.is_err(), "third connection of any kind must exceed Conns=2");
}

#[tokio::test]
async fn get_or_dial_respects_outbound_cap() {
    let network = MockNetwork::new();
    let a_id = NodeId::from_bytes([1u8; 32]);
    let b_id = NodeId::from_bytes([2u8; 32]);
    let c_id = NodeId::from_bytes([3u8; 32]);

    let b_transport = Arc::new(MockTransport::new(network.clone(), b_id));
    let listener_b = b_transport.listen(&addr(1)).await.unwrap();
    tokio::spawn(async move {
        loop {
            if listener_b.accept().await.is_err() {
                break;
            }
        }
    });
    let c_transport = Arc::new(MockTransport::new(network.clone(), c_id));
    let listener_c = c_transport.listen(&addr(2)).await.unwrap();
    tokio::spawn(async move {
        loop {
            if listener_c.accept().await.is_err() {
                break;
            }
        }
    });

    let a_transport = Arc::new(MockTransport::new(network, a_id));
    let system_limit = Limit { conns_outbound: 1, ..Limit::UNLIMITED };
    let resources = Arc::new(ResourceManager::new(system_limit, Limit::UNLIMITED));
    let swarm = dep2p_swarm::Swarm::new(a_transport, resources.clone(), SwarmConfig::default());

    let system = resources.system_scope();
    swarm.get_or_dial(b_id, &[addr(1)], system, Priority::Medium).await.unwrap();

    let err = swarm.get_or_dial(c_id, &[addr(2)], system, Priority::Medium).await;
    assert!(matches!(err, Err(SwarmError::Resource(_))));
}
