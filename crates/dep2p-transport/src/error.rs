//! Transport-layer error types.

use thiserror::Error;

/// Errors a `dial` call can distinguish, per the transport contract.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport refused the connection: {0}")]
    Refused(String),

    #[error("dial timed out")]
    Timeout,

    #[error("remote address unreachable: {0}")]
    Unreachable(String),

    #[error("local resource exhausted: {0}")]
    LocalResourceExhausted(String),

    #[error("listener bind failed on {addr}: {source}")]
    BindFailed { addr: String, source: String },

    #[error("this transport cannot dial address: {0}")]
    UnsupportedAddress(String),

    #[error("security handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("stream multiplexer error: {0}")]
    Multiplexer(String),

    #[error("stream closed")]
    StreamClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
