//! Pre-shared Realm keys and their publicly-shareable derived ids.
//!
//! A [`RealmKey`] is the secret that gates membership in a Realm; it must
//! never be transmitted or logged. [`RealmId`] is a one-way derivation of
//! that key, safe to embed in protocol ids and log lines, computed as:
//!
//! ```text
//! RealmId = SHA-256("dep2p-realm-id-v1" || SHA-256(RealmKey))
//! ```
//!
//! The double hash means an observer who learns a `RealmId` cannot invert
//! it back to the key nor use it directly as a MAC key.

use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

const DOMAIN_SEPARATOR: &[u8] = b"dep2p-realm-id-v1";

/// Name of the implicit Realm a node belongs to before it joins any
/// PSK-gated Realm of its own. `derive_realm_id` applied to the
/// UTF-8 bytes of this name gives the default, well-known `RealmId`.
pub const NO_REALM_NAME: &str = "no-Realm";

/// A pre-shared Realm secret. Never serialize this to a log line.
#[derive(Clone)]
pub struct RealmKey(Vec<u8>);

impl RealmKey {
    /// Generate a fresh 32-byte random key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Derive a key deterministically from a human-chosen passphrase.
    /// Used for the well-known no-Realm default and for operator-supplied
    /// shared secrets that are easier to type than raw key material.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(passphrase.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RealmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealmKey(<redacted, {} bytes>)", self.0.len())
    }
}

/// The public, non-invertible identifier derived from a [`RealmKey`].
/// Safe to log, to embed in [`crate::ProtocolId`]s, and to compare across
/// peers to confirm they share the same Realm without exchanging keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealmId([u8; 32]);

impl RealmId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 64-hex-character presentation produced by [`RealmId::to_hex`].
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if s.len() != 64 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 32,
                actual: s.len() / 2,
            });
        }
        let bytes =
            hex::decode(s).map_err(|e| IdentityError::MalformedPem(e.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Debug for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealmId({})", self.to_hex())
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Derive a Realm's public id from its pre-shared key via the two-level
/// SHA-256 construction described above.
pub fn derive_realm_id(key: &RealmKey) -> RealmId {
    let inner = Sha256::digest(key.as_bytes());
    let mut outer_input = Vec::with_capacity(DOMAIN_SEPARATOR.len() + inner.len());
    outer_input.extend_from_slice(DOMAIN_SEPARATOR);
    outer_input.extend_from_slice(&inner);
    let outer = Sha256::digest(&outer_input);
    let mut out = [0u8; 32];
    out.copy_from_slice(&outer);
    RealmId(out)
}

/// The default Realm id every node recognizes before joining any
/// PSK-gated Realm of its own.
pub fn no_realm_id() -> RealmId {
    derive_realm_id(&RealmKey::from_passphrase(NO_REALM_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = RealmKey::from_passphrase("shared-secret");
        assert_eq!(derive_realm_id(&key), derive_realm_id(&key));
    }

    #[test]
    fn distinct_keys_give_distinct_ids() {
        let a = RealmKey::from_passphrase("one");
        let b = RealmKey::from_passphrase("two");
        assert_ne!(derive_realm_id(&a), derive_realm_id(&b));
    }

    #[test]
    fn hex_round_trip() {
        let key = RealmKey::generate();
        let id = derive_realm_id(&key);
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(RealmId::parse(&hex).unwrap(), id);
    }

    #[test]
    fn no_realm_id_is_stable() {
        assert_eq!(no_realm_id(), no_realm_id());
    }

    #[test]
    fn realm_key_debug_never_prints_bytes() {
        let key = RealmKey::from_passphrase("super-secret-value");
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret-value"));
    }
}
