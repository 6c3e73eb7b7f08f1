//! Error types for the dial scheduler and path-health manager.

use thiserror::Error;

use dep2p_resource::ResourceError;
use dep2p_transport::TransportError;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("no known address for peer")]
    NoAddresses,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("dial suppressed: recent attempt to this peer is still within history window")]
    DialSuppressed,

    #[error("operation canceled")]
    Canceled,

    #[error("swarm is shutting down")]
    ShuttingDown,
}

pub type SwarmResult<T> = Result<T, SwarmError>;
