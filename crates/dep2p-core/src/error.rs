//! Error types for identity, address, and protocol-id parsing.

use thiserror::Error;

use crate::address::AddressError;

/// Errors surfaced by key-pair loading and `NodeId` derivation.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    #[error("unsupported key type tag: {0}")]
    UnsupportedKeyType(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("i/o error loading key file: {0}")]
    Io(String),
}

/// Errors surfaced by `ProtocolId` construction/parsing.
#[derive(Debug, Error)]
pub enum ProtocolIdError {
    #[error("protocol id must not be empty")]
    Empty,

    #[error("protocol id must not contain whitespace: {0:?}")]
    ContainsWhitespace(String),

    #[error("protocol id missing required namespace prefix: {0}")]
    MissingNamespace(String),

    #[error("malformed app protocol id, expected /dep2p/app/<realm>/<name>/<version>: {0}")]
    MalformedApp(String),
}

/// Top-level error aggregating every `dep2p-core` failure mode.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("address error: {0}")]
    Address(#[from] AddressError),

    #[error("protocol id error: {0}")]
    ProtocolId(#[from] ProtocolIdError),
}

pub type CoreResult<T> = Result<T, CoreError>;
