//! Error types for Realm authentication and transport key material.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("realm auth HMAC mismatch")]
    AuthFailed,

    #[error("realm auth timed out waiting for the peer's proof")]
    AuthTimeout,

    #[error("invalid challenge length: expected 32 bytes, got {0}")]
    InvalidChallengeLength(usize),

    #[error("invalid proof length: expected 32 bytes, got {0}")]
    InvalidProofLength(usize),

    #[error("failed to generate self-signed certificate: {0}")]
    CertificateGeneration(String),

    #[error("failed to parse certificate material: {0}")]
    CertificateParse(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
