//! The full configuration surface (§6): everything from the listen
//! port and identity through NAT, relay, liveness, and the
//! introspection server. [`Preset`] bundles coherent defaults for a
//! handful of common deployment shapes; an explicit field set on
//! [`Config`] always wins over whatever the preset chose.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use dep2p_core::KeyPair;
use dep2p_realm::config::{LivenessConfig, MessagingConfig, PubSubConfig};

use crate::error::{Dep2pError, Dep2pResult};

/// Where this node's long-term identity key comes from. Exactly one of
/// `key_file` or `private_key_pem` should be set; if neither is, a
/// fresh Ed25519 key is generated and held only in memory.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub key_file: Option<PathBuf>,
    pub private_key_pem: Option<String>,
}

impl IdentityConfig {
    pub fn resolve(&self) -> Dep2pResult<KeyPair> {
        if let Some(pem) = &self.private_key_pem {
            return KeyPair::from_pem_str(pem).map_err(|e| Dep2pError::Config(e.to_string()));
        }
        if let Some(path) = &self.key_file {
            if path.exists() {
                return KeyPair::from_pem_file(path).map_err(|e| Dep2pError::Config(e.to_string()));
            }
            let generated = KeyPair::generate_ed25519();
            std::fs::write(path, generated.to_pem()).map_err(|e| Dep2pError::Io(e.to_string()))?;
            return Ok(generated);
        }
        Ok(KeyPair::generate_ed25519())
    }
}

/// Watermarks the hierarchical resource manager enforces on the
/// top-level connection count (§4.3, §8 S4).
#[derive(Debug, Clone)]
pub struct ConnectionLimitsConfig {
    /// Connection count above which new low-priority dials are refused.
    pub low: i64,
    /// Connection count above which only high-priority work is admitted.
    pub high: i64,
    /// Hard cap; nothing is admitted above this regardless of priority.
    pub emergency: i64,
    /// How long a connection below the low watermark is exempt from
    /// trimming after it is established.
    pub grace: Duration,
    /// Idle connections older than this are candidates for trimming.
    pub idle_timeout: Duration,
}

impl Default for ConnectionLimitsConfig {
    fn default() -> Self {
        Self { low: 32, high: 96, emergency: 128, grace: Duration::from_secs(20), idle_timeout: Duration::from_secs(300) }
    }
}

#[derive(Debug, Clone)]
pub struct NatConfig {
    pub enable: bool,
    pub enable_upnp: bool,
    pub enable_autonat: bool,
    pub enable_holepunching: bool,
    pub stun_servers: Vec<String>,
    pub refresh_interval: Duration,
    pub external_addrs: Vec<String>,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            enable: true,
            enable_upnp: true,
            enable_autonat: true,
            enable_holepunching: true,
            stun_servers: Vec::new(),
            refresh_interval: Duration::from_secs(600),
            external_addrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub enable: bool,
    pub enable_server: bool,
    pub max_reservations: usize,
    pub max_circuits: usize,
    pub max_circuits_per_peer: usize,
    pub reservation_ttl: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enable: true,
            enable_server: false,
            max_reservations: 128,
            max_circuits: 16,
            max_circuits_per_peer: 4,
            reservation_ttl: Duration::from_secs(3600),
        }
    }
}

/// The introspection HTTP server (§4.6): off by default, and bound to
/// loopback even when enabled unless a caller explicitly overrides
/// `addr` with a non-loopback address.
#[derive(Debug, Clone)]
pub struct IntrospectConfig {
    pub enable: bool,
    pub addr: SocketAddr,
}

impl Default for IntrospectConfig {
    fn default() -> Self {
        Self { enable: false, addr: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 6060) }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub goodbye_wait: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { goodbye_wait: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone)]
pub struct MessagingSurfaceConfig {
    pub request_timeout: Duration,
    pub max_message_size: usize,
    pub pubsub: PubSubConfig,
}

impl Default for MessagingSurfaceConfig {
    fn default() -> Self {
        let defaults = MessagingConfig::default();
        Self { request_timeout: defaults.request_timeout, max_message_size: defaults.max_message_size, pubsub: PubSubConfig::default() }
    }
}

/// Every configuration key a node recognizes (§6). Construct with
/// [`Config::for_preset`] and then override individual fields, or build
/// one from scratch with `Config::default()`.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub identity: IdentityConfig,
    pub bootstrap_peers: Vec<String>,
    pub realm_key: Option<String>,
    pub realm_name: Option<String>,
    pub connection_limits: ConnectionLimitsConfig,
    pub nat: NatConfig,
    pub relay: RelayConfig,
    pub liveness: LivenessConfig,
    pub messaging: MessagingSurfaceConfig,
    pub introspect: IntrospectConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 0,
            identity: IdentityConfig::default(),
            bootstrap_peers: Vec::new(),
            realm_key: None,
            realm_name: None,
            connection_limits: ConnectionLimitsConfig::default(),
            nat: NatConfig::default(),
            relay: RelayConfig::default(),
            liveness: LivenessConfig::default(),
            messaging: MessagingSurfaceConfig::default(),
            introspect: IntrospectConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    pub fn for_preset(preset: Preset) -> Self {
        preset.apply(Self::default())
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let mut cfg = Self::default();
        cfg.identity.key_file = Some(data_dir.join("identity.pem"));
        cfg
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<String>) -> Self {
        self.bootstrap_peers = peers;
        self
    }

    pub fn with_realm_key(mut self, realm_key: impl Into<String>) -> Self {
        self.realm_key = Some(realm_key.into());
        self
    }

    pub fn with_introspect(mut self, addr: SocketAddr) -> Self {
        self.introspect = IntrospectConfig { enable: true, addr };
        self
    }

    /// Parses and validates every `bootstrap_peers` entry as a Full
    /// Address carrying an embedded `NodeId` (§6).
    pub fn parsed_bootstrap_peers(&self) -> Dep2pResult<Vec<dep2p_core::Address>> {
        self.bootstrap_peers
            .iter()
            .map(|s| {
                let addr = dep2p_core::Address::parse(s).map_err(|e| Dep2pError::Config(e.to_string()))?;
                addr.validate_bootstrap().map_err(|e| Dep2pError::Config(e.to_string()))?;
                Ok(addr)
            })
            .collect()
    }
}

/// Coherent default bundles for common deployment shapes (§6). Presets
/// only change defaults; any field explicitly set afterwards on the
/// returned [`Config`] still takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Battery- and data-constrained: fewer connections, longer
    /// liveness intervals, relay client only.
    Mobile,
    /// A typical end-user machine: moderate connection budget, NAT
    /// traversal and hole punching on.
    Desktop,
    /// A well-connected, publicly reachable host: high connection
    /// budget, acts as a relay server, aggressive liveness checking.
    Server,
    /// The smallest coherent configuration: no NAT traversal, no
    /// relay, no liveness heartbeats, for embedding or testing harness
    /// code that drives liveness manually.
    Minimal,
    /// Fast timeouts and a tiny connection budget, for integration
    /// tests that want liveness and dial failures to resolve quickly.
    Test,
}

impl Preset {
    fn apply(self, mut cfg: Config) -> Config {
        match self {
            Preset::Mobile => {
                cfg.connection_limits = ConnectionLimitsConfig {
                    low: 8,
                    high: 16,
                    emergency: 24,
                    grace: Duration::from_secs(30),
                    idle_timeout: Duration::from_secs(120),
                };
                cfg.liveness.heartbeat_interval = Duration::from_secs(30);
                cfg.liveness.heartbeat_timeout = Duration::from_secs(90);
                cfg.relay.enable_server = false;
                cfg.nat.enable_holepunching = false;
            }
            Preset::Desktop => {
                // defaults already describe a reasonable desktop node
            }
            Preset::Server => {
                cfg.connection_limits = ConnectionLimitsConfig {
                    low: 256,
                    high: 768,
                    emergency: 1024,
                    grace: Duration::from_secs(10),
                    idle_timeout: Duration::from_secs(600),
                };
                cfg.relay.enable_server = true;
                cfg.relay.max_reservations = 1024;
                cfg.relay.max_circuits = 256;
                cfg.liveness.heartbeat_interval = Duration::from_secs(10);
            }
            Preset::Minimal => {
                cfg.nat.enable = false;
                cfg.nat.enable_upnp = false;
                cfg.nat.enable_autonat = false;
                cfg.nat.enable_holepunching = false;
                cfg.relay.enable = false;
                cfg.liveness.enable = false;
            }
            Preset::Test => {
                cfg.connection_limits = ConnectionLimitsConfig {
                    low: 8,
                    high: 16,
                    emergency: 32,
                    grace: Duration::from_millis(100),
                    idle_timeout: Duration::from_secs(5),
                };
                cfg.liveness.heartbeat_interval = Duration::from_millis(200);
                cfg.liveness.heartbeat_timeout = Duration::from_millis(500);
                cfg.liveness.status_expiry = Duration::from_secs(2);
                cfg.shutdown.goodbye_wait = Duration::from_millis(50);
                cfg.nat.enable = false;
                cfg.relay.enable = false;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_preset_shrinks_connection_budget_below_default() {
        let cfg = Config::for_preset(Preset::Mobile);
        assert!(cfg.connection_limits.emergency < Config::default().connection_limits.emergency);
    }

    #[test]
    fn minimal_preset_disables_every_ambient_service() {
        let cfg = Config::for_preset(Preset::Minimal);
        assert!(!cfg.nat.enable);
        assert!(!cfg.relay.enable);
        assert!(!cfg.liveness.enable);
    }

    #[test]
    fn explicit_override_wins_over_preset_default() {
        let cfg = Config::for_preset(Preset::Mobile).with_listen_port(4001);
        assert_eq!(cfg.listen_port, 4001);
    }

    #[test]
    fn identity_resolves_to_a_fresh_key_when_unconfigured() {
        let cfg = Config::default();
        let kp = cfg.identity.resolve().unwrap();
        assert!(!kp.node_id().is_empty());
    }
}
