//! Peer identifiers derived from long-term public keys.

use std::fmt;

use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// Fixed-size 32-byte peer identifier.
///
/// `NodeId` is a pure value type: total equality, a byte-lexicographic
/// total order, and an XOR metric for Kademlia-style distance and
/// common-prefix-length arithmetic. [`NodeId::EMPTY`] is a distinguished
/// sentinel that never identifies a real peer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// The sentinel empty identifier. Never a valid peer.
    pub const EMPTY: NodeId = NodeId([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a `NodeId` from a raw public key.
    ///
    /// Ed25519 public keys are already 32 bytes and are used verbatim
    /// (a property applications rely on when they compare a `NodeId`
    /// against a certificate's raw key). Any other length is hashed down
    /// to 32 bytes with SHA-256 so the identifier stays fixed-size
    /// regardless of key type.
    pub fn from_public_key_bytes(public_key: &[u8]) -> Self {
        if public_key.len() == 32 {
            let mut out = [0u8; 32];
            out.copy_from_slice(public_key);
            Self(out)
        } else {
            let digest = Sha256::digest(public_key);
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            Self(out)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as the external Base58 presentation.
    pub fn to_base58(&self) -> String {
        self.0.to_base58()
    }

    /// Parse the Base58 presentation produced by [`NodeId::to_base58`].
    pub fn from_base58(s: &str) -> Result<Self, IdentityError> {
        let bytes = s
            .from_base58()
            .map_err(|_| IdentityError::MalformedPem(format!("invalid base58 node id: {s}")))?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// XOR distance used for Kademlia-style arithmetic.
    pub fn xor_distance(&self, other: &NodeId) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Number of leading bits shared between the two ids' XOR distance,
    /// i.e. the common-prefix-length used to bucket peers in a Kademlia
    /// routing table.
    pub fn common_prefix_len(&self, other: &NodeId) -> u32 {
        let distance = self.xor_distance(other);
        let mut bits = 0u32;
        for byte in distance {
            if byte == 0 {
                bits += 8;
                continue;
            }
            bits += byte.leading_zeros();
            break;
        }
        bits
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_base58())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base58_roundtrip() {
        let id = NodeId::from_public_key_bytes(&[7u8; 32]);
        let rendered = id.to_base58();
        let parsed = NodeId::from_base58(&rendered).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn empty_is_sentinel() {
        assert!(NodeId::EMPTY.is_empty());
        let derived = NodeId::from_public_key_bytes(&[1u8; 32]);
        assert!(!derived.is_empty());
    }

    #[test]
    fn non_32_byte_keys_are_hashed() {
        let a = NodeId::from_public_key_bytes(&[9u8; 33]);
        let b = NodeId::from_public_key_bytes(&[9u8; 33]);
        assert_eq!(a, b);
        assert_ne!(a.as_bytes(), &[9u8; 32]);
    }

    #[test]
    fn xor_distance_is_symmetric_and_zero_for_self() {
        let a = NodeId::from_public_key_bytes(&[1u8; 32]);
        let b = NodeId::from_public_key_bytes(&[2u8; 32]);
        assert_eq!(a.xor_distance(&b), b.xor_distance(&a));
        assert_eq!(a.xor_distance(&a), [0u8; 32]);
    }

    #[test]
    fn common_prefix_len_full_for_equal_ids() {
        let a = NodeId::from_public_key_bytes(&[3u8; 32]);
        assert_eq!(a.common_prefix_len(&a), 256);
    }

    #[test]
    fn total_ordering_is_byte_lexicographic() {
        let a = NodeId::from_bytes([0u8; 32]);
        let mut b_bytes = [0u8; 32];
        b_bytes[31] = 1;
        let b = NodeId::from_bytes(b_bytes);
        assert!(a < b);
    }
}
