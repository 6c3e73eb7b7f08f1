//! Error types for Realm membership and the protocol services built on
//! top of it (§7).

use thiserror::Error;

use dep2p_core::error::ProtocolIdError;
use dep2p_resource::ResourceError;
use dep2p_swarm::SwarmError;
use dep2p_transport::TransportError;

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("already joined a Realm with this key")]
    AlreadyJoined,

    #[error("already joined a different Realm; leave it first")]
    ConflictingRealm,

    #[error("not currently joined to any Realm")]
    NotJoined,

    #[error("RealmAuth handshake failed")]
    AuthFailed,

    #[error("peer is not a member of any Realm this service tracks")]
    NotRealmMember,

    #[error(transparent)]
    InvalidProtocol(#[from] ProtocolIdError),

    #[error("a handler is already registered for this protocol")]
    HandlerAlreadyRegistered,

    #[error("no handler registered for this protocol")]
    NoHandler,

    #[error("operation timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("malformed wire message: {0}")]
    Codec(String),

    #[error("goodbye reason exceeds 256 bytes")]
    GoodbyeTooLong,
}

impl RealmError {
    /// §4.5.3: every failure is transient (retryable) except these.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            RealmError::Timeout
                | RealmError::Canceled
                | RealmError::NotRealmMember
                | RealmError::InvalidProtocol(_)
        )
    }
}

pub type RealmResult<T> = Result<T, RealmError>;
