//! Known addresses for peers, consulted by Messaging's auto-dial and by
//! the Streams service (§4.5.3: "auto-dial using addresses from the
//! Peerstore").

use dashmap::DashMap;

use dep2p_core::{Address, NodeId};

#[derive(Default)]
pub struct Peerstore {
    addresses: DashMap<NodeId, Vec<Address>>,
}

impl Peerstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(&self, peer: NodeId, address: Address) {
        let mut entry = self.addresses.entry(peer).or_default();
        if !entry.contains(&address) {
            entry.push(address);
        }
    }

    pub fn addresses(&self, peer: &NodeId) -> Vec<Address> {
        self.addresses.get(peer).map(|a| a.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use dep2p_core::AddressComponent;

    #[test]
    fn deduplicates_addresses() {
        let store = Peerstore::new();
        let peer = NodeId::from_bytes([1u8; 32]);
        let addr = Address::new(vec![AddressComponent::Ip4(Ipv4Addr::LOCALHOST), AddressComponent::Udp(1), AddressComponent::QuicV1]);
        store.add_address(peer, addr.clone());
        store.add_address(peer, addr.clone());
        assert_eq!(store.addresses(&peer).len(), 1);
    }
}
