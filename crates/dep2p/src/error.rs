//! Top-level error aggregating every subsystem failure mode (§7).

use thiserror::Error;

use dep2p_core::error::CoreError;
use dep2p_realm::RealmError;
use dep2p_resource::ResourceError;
use dep2p_swarm::SwarmError;
use dep2p_transport::TransportError;

#[derive(Debug, Error)]
pub enum Dep2pError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error(transparent)]
    Realm(#[from] RealmError),

    #[error("node already started")]
    AlreadyStarted,

    #[error("node not started")]
    NotStarted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("channel closed: {0}")]
    Channel(String),
}

impl<T> From<tokio::sync::broadcast::error::SendError<T>> for Dep2pError {
    fn from(e: tokio::sync::broadcast::error::SendError<T>) -> Self {
        Dep2pError::Channel(e.to_string())
    }
}

pub type Dep2pResult<T> = Result<T, Dep2pError>;
