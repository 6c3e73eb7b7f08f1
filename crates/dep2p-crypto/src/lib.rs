//! # dep2p-crypto
//!
//! Cryptographic primitives for Realm membership proofs and the
//! transport security handshake. Two concerns live here:
//!
//! - [`realm_auth`]: the HMAC-SHA256 challenge/response that proves
//!   knowledge of a Realm's pre-shared key without ever transmitting it.
//! - [`transport_cert`]: self-signed TLS leaf certificates nodes present
//!   during the QUIC/TCP security handshake, binding their `NodeId`
//!   into the certificate itself.
//!
//! Long-term identity keys and `NodeId` derivation live in
//! `dep2p-core`; this crate only adds the pieces that need rcgen, hmac,
//! and constant-time comparison on top of that base.

pub mod error;
pub mod realm_auth;
pub mod transport_cert;

pub use dep2p_core::NodeId;
pub use error::{CryptoError, CryptoResult};
pub use realm_auth::{compute_proof, generate_challenge, verify_proof, CHALLENGE_LEN};
pub use transport_cert::{generate_self_signed_cert, node_id_from_cert_der, SelfSignedCert};
