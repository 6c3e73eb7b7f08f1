//! Slash-separated multi-component transport addresses.
//!
//! An [`Address`] is an ordered list of [`AddressComponent`]s, parsed from
//! and rendered back to the text form described in `spec.md` §6:
//! `ip4`/`ip6`/`dns4`/`dns6` paired with `udp`+`quic-v1` or `tcp`, followed
//! by an optional `/p2p/<NodeId>` terminator and an optional
//! `/p2p-circuit/...` relay marker.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node_id::NodeId;

/// One slash-separated token of an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressComponent {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    Dns4(String),
    Dns6(String),
    Udp(u16),
    Tcp(u16),
    QuicV1,
    P2p(NodeId),
    P2pCircuit,
}

impl fmt::Display for AddressComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressComponent::Ip4(ip) => write!(f, "/ip4/{ip}"),
            AddressComponent::Ip6(ip) => write!(f, "/ip6/{ip}"),
            AddressComponent::Dns4(name) => write!(f, "/dns4/{name}"),
            AddressComponent::Dns6(name) => write!(f, "/dns6/{name}"),
            AddressComponent::Udp(port) => write!(f, "/udp/{port}"),
            AddressComponent::Tcp(port) => write!(f, "/tcp/{port}"),
            AddressComponent::QuicV1 => write!(f, "/quic-v1"),
            AddressComponent::P2p(id) => write!(f, "/p2p/{id}"),
            AddressComponent::P2pCircuit => write!(f, "/p2p-circuit"),
        }
    }
}

/// The three address shapes distinguished in `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// No terminal `/p2p/<NodeId>` component: a transport endpoint only.
    Dial,
    /// A dial address followed by `/p2p/<NodeId>`; self-authenticating.
    Full,
    /// Contains a `/p2p-circuit/` separator; reachable only via a relay.
    RelayCircuit,
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("address must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("unknown address token: {0:?}")]
    UnknownToken(String),

    #[error("invalid ip4 literal: {0:?}")]
    InvalidIp4(String),

    #[error("invalid ip6 literal: {0:?}")]
    InvalidIp6(String),

    #[error("missing hostname after {0}")]
    MissingHostname(&'static str),

    #[error("invalid port {0:?}: must be 1-65535")]
    InvalidPort(String),

    #[error("port component used without a preceding address family")]
    PortWithoutFamily,

    #[error("ascii control character in address: {0:?}")]
    ControlCharacter(String),

    #[error("invalid /p2p node id: {0}")]
    InvalidNodeId(String),

    #[error("trailing garbage after /p2p-circuit: {0:?}")]
    TrailingAfterCircuit(String),

    #[error("bootstrap address must be a Full Address")]
    BootstrapNotFull,

    #[error("RelayCircuitAddress not allowed for bootstrap seeds")]
    BootstrapIsRelayCircuit,
}

/// A parsed, layered transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    components: Vec<AddressComponent>,
}

impl Address {
    pub fn new(components: Vec<AddressComponent>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[AddressComponent] {
        &self.components
    }

    /// Parse the slash-separated text form. Fails closed: the first
    /// violating rule names a typed error, never a best-effort guess.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.chars().any(|c| c.is_ascii_control()) {
            return Err(AddressError::ControlCharacter(s.to_string()));
        }
        if !s.starts_with('/') {
            return Err(AddressError::MissingLeadingSlash(s.to_string()));
        }

        let mut tokens = s.split('/').peekable();
        tokens.next(); // leading empty segment before the first '/'

        let mut components = Vec::new();
        let mut have_family = false;

        while let Some(tok) = tokens.next() {
            match tok {
                "ip4" => {
                    let v = tokens
                        .next()
                        .ok_or(AddressError::MissingHostname("ip4"))?;
                    let ip: Ipv4Addr = v
                        .parse()
                        .map_err(|_| AddressError::InvalidIp4(v.to_string()))?;
                    components.push(AddressComponent::Ip4(ip));
                    have_family = true;
                }
                "ip6" => {
                    let v = tokens
                        .next()
                        .ok_or(AddressError::MissingHostname("ip6"))?;
                    let ip: Ipv6Addr = v
                        .parse()
                        .map_err(|_| AddressError::InvalidIp6(v.to_string()))?;
                    components.push(AddressComponent::Ip6(ip));
                    have_family = true;
                }
                "dns4" => {
                    let v = tokens
                        .next()
                        .ok_or(AddressError::MissingHostname("dns4"))?;
                    components.push(AddressComponent::Dns4(v.to_string()));
                    have_family = true;
                }
                "dns6" => {
                    let v = tokens
                        .next()
                        .ok_or(AddressError::MissingHostname("dns6"))?;
                    components.push(AddressComponent::Dns6(v.to_string()));
                    have_family = true;
                }
                "udp" => {
                    if !have_family {
                        return Err(AddressError::PortWithoutFamily);
                    }
                    let v = tokens.next().ok_or(AddressError::MissingHostname("udp"))?;
                    let port = parse_port(v)?;
                    components.push(AddressComponent::Udp(port));
                }
                "tcp" => {
                    if !have_family {
                        return Err(AddressError::PortWithoutFamily);
                    }
                    let v = tokens.next().ok_or(AddressError::MissingHostname("tcp"))?;
                    let port = parse_port(v)?;
                    components.push(AddressComponent::Tcp(port));
                }
                "quic-v1" => components.push(AddressComponent::QuicV1),
                "p2p" => {
                    let v = tokens.next().ok_or(AddressError::MissingHostname("p2p"))?;
                    let id = NodeId::from_base58(v)
                        .map_err(|e| AddressError::InvalidNodeId(e.to_string()))?;
                    components.push(AddressComponent::P2p(id));
                }
                "p2p-circuit" => {
                    components.push(AddressComponent::P2pCircuit);
                    let rest: Vec<&str> = tokens.by_ref().collect();
                    if !rest.is_empty() && !rest.iter().all(|t| t.is_empty()) {
                        // A relay-circuit address may legitimately continue
                        // with the target's own components (e.g.
                        // `/p2p-circuit/p2p/<other>`); only reject tokens
                        // this parser cannot recognize at all.
                        let trailing = format!("/{}", rest.join("/"));
                        let mut sub = tokens_from(&rest);
                        components.append(&mut sub.map_err(|_| {
                            AddressError::TrailingAfterCircuit(trailing.clone())
                        })?);
                    }
                }
                "" => {}
                other => return Err(AddressError::UnknownToken(other.to_string())),
            }
        }

        Ok(Self { components })
    }

    /// Render back to the canonical text form. `render(parse(s)) == s`
    /// for any syntactically valid `s` (Testable Property 2).
    pub fn render(&self) -> String {
        let mut out = String::new();
        for c in &self.components {
            out.push_str(&c.to_string());
        }
        out
    }

    pub fn kind(&self) -> AddressKind {
        if self
            .components
            .iter()
            .any(|c| matches!(c, AddressComponent::P2pCircuit))
        {
            AddressKind::RelayCircuit
        } else if matches!(self.components.last(), Some(AddressComponent::P2p(_))) {
            AddressKind::Full
        } else {
            AddressKind::Dial
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self.kind(), AddressKind::Full)
    }

    pub fn is_relay_circuit(&self) -> bool {
        matches!(self.kind(), AddressKind::RelayCircuit)
    }

    /// Terminal `/p2p/<NodeId>` component, if present.
    pub fn node_id(&self) -> Option<NodeId> {
        self.components.iter().rev().find_map(|c| match c {
            AddressComponent::P2p(id) => Some(*id),
            _ => None,
        })
    }

    /// Validate this address as an acceptable bootstrap seed: must be a
    /// Full Address and must not contain a relay-circuit marker
    /// (Testable Property 4 / scenario S3).
    pub fn validate_bootstrap(&self) -> Result<(), AddressError> {
        if self.is_relay_circuit() {
            return Err(AddressError::BootstrapIsRelayCircuit);
        }
        if !self.is_full() {
            return Err(AddressError::BootstrapNotFull);
        }
        Ok(())
    }
}

fn parse_port(s: &str) -> Result<u16, AddressError> {
    let port: u32 = s
        .parse()
        .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
    if port == 0 || port > u16::MAX as u32 {
        return Err(AddressError::InvalidPort(s.to_string()));
    }
    Ok(port as u16)
}

/// Re-parse a list of already-split tokens as a nested address tail
/// (used only for the rare `/p2p-circuit/p2p/<target>` form).
fn tokens_from(rest: &[&str]) -> Result<Vec<AddressComponent>, AddressError> {
    let joined = format!("/{}", rest.join("/"));
    Address::parse(&joined).map(|a| a.components)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_symmetry_dial_address() {
        let s = "/ip4/203.0.113.5/udp/4001/quic-v1";
        let addr = Address::parse(s).unwrap();
        assert_eq!(addr.render(), s);
        assert_eq!(addr.kind(), AddressKind::Dial);
    }

    #[test]
    fn parse_render_symmetry_full_address() {
        let kp = crate::keypair::KeyPair::generate_ed25519();
        let id = kp.node_id();
        let s = format!("/ip4/1.2.3.4/udp/4001/quic-v1/p2p/{id}");
        let addr = Address::parse(&s).unwrap();
        assert_eq!(addr.render(), s);
        assert!(addr.is_full());
        assert_eq!(addr.node_id(), Some(id));
    }

    #[test]
    fn tcp_address_roundtrip() {
        let s = "/ip4/127.0.0.1/tcp/9000";
        let addr = Address::parse(s).unwrap();
        assert_eq!(addr.render(), s);
    }

    #[test]
    fn dns4_address_roundtrip() {
        let s = "/dns4/bootstrap.dep2p.io/udp/4001/quic-v1";
        let addr = Address::parse(s).unwrap();
        assert_eq!(addr.render(), s);
    }

    #[test]
    fn dial_address_missing_p2p_is_not_full() {
        let addr = Address::parse("/ip4/203.0.113.5/udp/4001/quic-v1").unwrap();
        assert!(!addr.is_full());
        assert_eq!(
            addr.validate_bootstrap().unwrap_err().to_string(),
            "bootstrap address must be a Full Address"
        );
    }

    #[test]
    fn relay_circuit_rejected_for_bootstrap() {
        let kp1 = crate::keypair::KeyPair::generate_ed25519();
        let kp2 = crate::keypair::KeyPair::generate_ed25519();
        let s = format!(
            "/ip4/1.2.3.4/udp/4001/quic-v1/p2p/{}/p2p-circuit/p2p/{}",
            kp1.node_id(),
            kp2.node_id()
        );
        let addr = Address::parse(&s).unwrap();
        assert!(addr.is_relay_circuit());
        assert!(matches!(
            addr.validate_bootstrap(),
            Err(AddressError::BootstrapIsRelayCircuit)
        ));
    }

    #[test]
    fn full_address_accepted_for_bootstrap() {
        let kp = crate::keypair::KeyPair::generate_ed25519();
        let s = format!("/ip4/1.2.3.4/udp/4001/quic-v1/p2p/{}", kp.node_id());
        let addr = Address::parse(&s).unwrap();
        assert!(addr.validate_bootstrap().is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        let s = "/ip4/1.2.3.4/udp/4001\u{0007}/quic-v1";
        assert!(matches!(
            Address::parse(s),
            Err(AddressError::ControlCharacter(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let s = "/ip4/1.2.3.4/udp/70000/quic-v1";
        assert!(matches!(Address::parse(s), Err(AddressError::InvalidPort(_))));
    }

    #[test]
    fn rejects_port_without_family() {
        assert!(matches!(
            Address::parse("/udp/4001"),
            Err(AddressError::PortWithoutFamily)
        ));
    }

    #[test]
    fn rejects_unknown_token() {
        assert!(matches!(
            Address::parse("/sctp/9"),
            Err(AddressError::UnknownToken(_))
        ));
    }

    #[test]
    fn structurally_distinct_families_are_not_equal() {
        let ip4 = Address::parse("/ip4/1.2.3.4/udp/4001/quic-v1").unwrap();
        let dns4 = Address::parse("/dns4/1.2.3.4/udp/4001/quic-v1").unwrap();
        assert_ne!(ip4, dns4);
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(matches!(Address::parse(""), Err(AddressError::Empty)));
    }
}
