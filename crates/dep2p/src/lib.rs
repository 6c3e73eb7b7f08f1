//! # dep2p
//!
//! The façade crate applications depend on: [`Node`] ties identity
//! ([`dep2p_core`]), the resource hierarchy ([`dep2p_resource`]),
//! transport ([`dep2p_transport`]), connection/path management
//! ([`dep2p_swarm`]), and Realm membership/messaging
//! ([`dep2p_realm`]) into one lifecycle, configured by [`config::Config`]
//! and [`config::Preset`].
//!
//! A node always owns exactly one [`dep2p_realm::Realm`]: it starts in
//! `NotJoined` state and transitions to `Joined` when `start()` finds a
//! `realm_key` in its configuration, or later via [`Node::join_realm`].

pub mod config;
pub mod error;
pub mod introspect;

pub use config::{Config, Preset};
pub use error::{Dep2pError, Dep2pResult};

pub mod prelude {
    pub use crate::config::{Config, Preset};
    pub use crate::error::{Dep2pError, Dep2pResult};
    pub use crate::Node;
    pub use dep2p_core::{Address, KeyPair, NodeId, RealmId};
    pub use dep2p_logging::{init_default, init_development, LogConfig};
    pub use dep2p_realm::{MessageHandler, PubSubMessage, RealmEvent, StreamHandler};
    pub use dep2p_transport::{Connection, Stream, Transport};
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use dep2p_core::{Address, KeyPair, NodeId};
use dep2p_resource::{Limit, Priority, ResourceManager, ScopeKind};
use dep2p_realm::Realm;
use dep2p_swarm::dial_scheduler::{DialOutcome, DialScheduler, StaticPeer};
use dep2p_swarm::{Swarm, SwarmConfig};
use dep2p_transport::{Listener, Transport};

/// Background tasks a started [`Node`] keeps alive until it is stopped.
struct RunningTasks {
    listen_loop: JoinHandle<()>,
    dial_scheduler: JoinHandle<()>,
    dial_outcomes: JoinHandle<()>,
    bandwidth_rollup: JoinHandle<()>,
    introspect: Option<JoinHandle<()>>,
    dial_shutdown_tx: mpsc::Sender<()>,
    bandwidth_shutdown_tx: mpsc::Sender<()>,
}

/// A running (or not-yet-started) peer on the overlay network. Generic
/// over the [`Transport`] implementation so the same code drives QUIC,
/// TCP, or (in tests) the in-memory mock transport.
pub struct Node<T: Transport> {
    config: Config,
    identity: KeyPair,
    resources: Arc<ResourceManager>,
    transport: Arc<T>,
    swarm: Arc<Swarm<T>>,
    realm: Arc<Realm<T>>,
    dial_scheduler: Arc<DialScheduler<T>>,
    dial_outcomes_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<DialOutcome>>>,
    started: AtomicBool,
    tasks: std::sync::Mutex<Option<RunningTasks>>,
}

impl<T: Transport + 'static> Node<T> {
    /// Builds a node from a pre-constructed transport. Most callers
    /// should go through a transport-specific constructor instead (see
    /// `dep2p_transport::QuicTransport`/`TcpTransport`), passing the
    /// identity [`Config::identity`] resolves to.
    pub fn with_transport(config: Config, transport: Arc<T>) -> Dep2pResult<Self> {
        let identity = config.identity.resolve()?;

        let system_limit = Limit { conns_total: config.connection_limits.emergency, ..Limit::UNLIMITED };
        let resources = Arc::new(ResourceManager::new(system_limit, Limit::UNLIMITED));

        let swarm_cfg = SwarmConfig::default();
        let swarm = Arc::new(Swarm::new(Arc::clone(&transport), Arc::clone(&resources), swarm_cfg.clone()));

        let realm_cfg = dep2p_realm::RealmConfig {
            auth: dep2p_realm::config::AuthConfig::default(),
            messaging: dep2p_realm::config::MessagingConfig {
                request_timeout: config.messaging.request_timeout,
                max_message_size: config.messaging.max_message_size,
                ..dep2p_realm::config::MessagingConfig::default()
            },
            pubsub: config.messaging.pubsub.clone(),
            liveness: config.liveness.clone(),
        };
        let realm = Arc::new(Realm::new(identity.node_id(), Arc::clone(&swarm), Arc::clone(&resources), realm_cfg));

        let static_peers = config
            .parsed_bootstrap_peers()?
            .into_iter()
            .filter_map(|addr| addr.node_id().map(|node_id| StaticPeer { node_id, addresses: vec![addr] }))
            .collect();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let dial_scheduler = Arc::new(DialScheduler::new(
            Arc::clone(&transport),
            swarm_cfg,
            Arc::clone(swarm.path_health()),
            static_peers,
            outcome_tx,
        ));

        Ok(Self {
            config,
            identity,
            resources,
            transport,
            swarm,
            realm,
            dial_scheduler,
            dial_outcomes_rx: std::sync::Mutex::new(Some(outcome_rx)),
            started: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    pub fn identity(&self) -> &KeyPair {
        &self.identity
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn swarm(&self) -> &Arc<Swarm<T>> {
        &self.swarm
    }

    pub fn realm(&self) -> &Arc<Realm<T>> {
        &self.realm
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Starts listening, dialing bootstrap peers, and (if configured) a
    /// Realm, plus the ambient bandwidth rollup and introspection
    /// server. Returns [`Dep2pError::AlreadyStarted`] on a second call.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Dep2pResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Dep2pError::AlreadyStarted);
        }

        let listen_addr = listen_address(self.config.listen_port);
        let listener = self.transport.listen(&listen_addr).await?;
        let listen_loop = spawn_listen_loop(Arc::clone(self), listener);

        let (dial_shutdown_tx, dial_shutdown_rx) = mpsc::channel(1);
        let dial_scheduler_handle = Arc::clone(&self.dial_scheduler).spawn(dial_shutdown_rx);

        let mut outcome_rx = self
            .dial_outcomes_rx
            .lock()
            .expect("dial_outcomes_rx lock poisoned")
            .take()
            .expect("start() called more than once past the AlreadyStarted guard");
        let dial_outcomes = {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(outcome) = outcome_rx.recv().await {
                    node.handle_dial_outcome(outcome);
                }
            })
        };

        let (bandwidth_shutdown_tx, bandwidth_shutdown_rx) = mpsc::channel(1);
        let bandwidth_rollup = Arc::clone(self.swarm.bandwidth()).spawn(
            std::time::Duration::from_secs(10),
            bandwidth_shutdown_rx,
        );

        let introspect = if self.config.introspect.enable {
            Some(introspect::spawn(Arc::clone(self)).await?)
        } else {
            None
        };

        if let Some(realm_key) = self.config.realm_key.clone() {
            self.realm.join(&realm_key)?;
        }

        *self.tasks.lock().expect("tasks lock poisoned") = Some(RunningTasks {
            listen_loop,
            dial_scheduler: dial_scheduler_handle,
            dial_outcomes,
            bandwidth_rollup,
            introspect,
            dial_shutdown_tx,
            bandwidth_shutdown_tx,
        });

        info!(node_id = %self.node_id(), %listen_addr, "node started");
        Ok(())
    }

    fn handle_dial_outcome(&self, outcome: DialOutcome) {
        match outcome.result {
            Ok(conn) => {
                if let Err(e) = self.swarm.register_dialed(conn, self.resources.transient_scope(), Priority::Medium) {
                    warn!(peer = %outcome.peer, error = %e, "failed to register dialed bootstrap connection");
                } else {
                    self.dial_scheduler.note_connected();
                }
            }
            Err(e) => {
                warn!(peer = %outcome.peer, error = %e, "bootstrap dial failed");
            }
        }
    }

    /// Joins a Realm outside of `start()`'s automatic join, e.g. to
    /// switch Realms at runtime.
    pub fn join_realm(&self, key_material: &str) -> Dep2pResult<()> {
        self.realm.join(key_material)?;
        Ok(())
    }

    /// Stops all background tasks, sends goodbye to connected peers if
    /// currently in a Realm, and marks the node stopped. Idempotent.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Dep2pResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Err(Dep2pError::NotStarted);
        }

        if self.realm.manager().state() == dep2p_realm::RealmState::Joined {
            if let Err(e) = self.realm.leave().await {
                warn!(error = %e, "error leaving realm during shutdown");
            }
        }

        if let Some(tasks) = self.tasks.lock().expect("tasks lock poisoned").take() {
            let _ = tasks.dial_shutdown_tx.send(()).await;
            let _ = tasks.bandwidth_shutdown_tx.send(()).await;
            tasks.listen_loop.abort();
            tasks.dial_scheduler.abort();
            tasks.dial_outcomes.abort();
            tasks.bandwidth_rollup.abort();
            if let Some(introspect) = tasks.introspect {
                introspect.abort();
            }
        }

        info!(node_id = %self.node_id(), "node stopped");
        Ok(())
    }
}

fn listen_address(port: u16) -> Address {
    use std::net::Ipv4Addr;
    use dep2p_core::AddressComponent;
    Address::new(vec![
        AddressComponent::Ip4(Ipv4Addr::UNSPECIFIED),
        AddressComponent::Udp(port),
        AddressComponent::QuicV1,
    ])
}

fn spawn_listen_loop<T: Transport + 'static>(node: Arc<Node<T>>, listener: Box<dyn Listener>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "listener accept failed, stopping accept loop");
                    break;
                }
            };
            let peer = conn.remote_node_id();
            if let Err(e) = node.swarm.accept(conn.clone(), node.resources.transient_scope(), Priority::High) {
                warn!(%peer, error = %e, "rejected inbound connection");
                continue;
            }
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                loop {
                    match conn.accept_stream().await {
                        Ok(stream) => {
                            let node = Arc::clone(&node);
                            tokio::spawn(async move {
                                if let Err(e) = node.realm.handle_inbound_stream(peer, stream).await {
                                    warn!(%peer, error = %e, "inbound stream handling failed");
                                }
                            });
                        }
                        Err(_) => break,
                    }
                }
            });
        }
    })
}

/// Allocates a dedicated resource scope for a named long-running
/// service (e.g. an application protocol handler), rooted under the
/// node's System scope per §4.3's Service rung.
pub fn service_scope<T: Transport>(node: &Node<T>, label: impl Into<String>) -> Dep2pResult<dep2p_resource::ScopeId> {
    Ok(node.resources.create_child_scope(node.resources.system_scope(), ScopeKind::Service, label, Limit::UNLIMITED)?)
}
