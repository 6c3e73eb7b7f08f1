//! Long-term identity key pairs.

use std::fmt;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use p256::ecdsa::signature::Signer as P256Signer;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use rand_core::OsRng;

use crate::error::IdentityError;
use crate::node_id::NodeId;

/// Which signature scheme backs a [`KeyPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    EcdsaP256,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ed25519 => write!(f, "ed25519"),
            KeyType::EcdsaP256 => write!(f, "ecdsa-p256"),
        }
    }
}

enum Inner {
    Ed25519(SigningKey),
    EcdsaP256(P256SigningKey),
}

/// A node's long-term identity key pair.
///
/// A node owns exactly one active `KeyPair` for its lifetime. Ed25519 is
/// the default scheme; ECDSA-P256 is accepted for interop with peers that
/// require it. The public half and its [`NodeId`] are pure, deterministic
/// derivations from the private half.
pub struct KeyPair {
    inner: Inner,
}

impl KeyPair {
    /// Generate a fresh Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            inner: Inner::Ed25519(signing_key),
        }
    }

    /// Generate a fresh ECDSA-P256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let signing_key = P256SigningKey::random(&mut OsRng);
        Self {
            inner: Inner::EcdsaP256(signing_key),
        }
    }

    /// Load a private key from a PEM-encoded file.
    ///
    /// The PEM tag selects the scheme: `PRIVATE KEY` is treated as a raw
    /// 32-byte Ed25519 seed; `EC PRIVATE KEY` as a P256 scalar.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| IdentityError::Io(e.to_string()))?;
        Self::from_pem_str(&data)
    }

    pub fn from_pem_str(pem_str: &str) -> Result<Self, IdentityError> {
        let parsed =
            pem::parse(pem_str).map_err(|e| IdentityError::MalformedPem(e.to_string()))?;
        match parsed.tag() {
            "PRIVATE KEY" => {
                let bytes = parsed.contents();
                if bytes.len() != 32 {
                    return Err(IdentityError::InvalidKeyLength {
                        expected: 32,
                        actual: bytes.len(),
                    });
                }
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Ok(Self {
                    inner: Inner::Ed25519(SigningKey::from_bytes(&seed)),
                })
            }
            "EC PRIVATE KEY" => {
                let signing_key = P256SigningKey::from_slice(parsed.contents())
                    .map_err(|e| IdentityError::MalformedPem(e.to_string()))?;
                Ok(Self {
                    inner: Inner::EcdsaP256(signing_key),
                })
            }
            other => Err(IdentityError::UnsupportedKeyType(other.to_string())),
        }
    }

    /// Write the private key in PEM form (for first-run persistence).
    pub fn to_pem(&self) -> String {
        let (tag, contents): (&str, Vec<u8>) = match &self.inner {
            Inner::Ed25519(k) => ("PRIVATE KEY", k.to_bytes().to_vec()),
            Inner::EcdsaP256(k) => ("EC PRIVATE KEY", k.to_bytes().to_vec()),
        };
        let block = pem::Pem::new(tag, contents);
        pem::encode(&block)
    }

    pub fn key_type(&self) -> KeyType {
        match &self.inner {
            Inner::Ed25519(_) => KeyType::Ed25519,
            Inner::EcdsaP256(_) => KeyType::EcdsaP256,
        }
    }

    /// Raw public key bytes (32 bytes for Ed25519, SEC1-compressed 33
    /// bytes for P256).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match &self.inner {
            Inner::Ed25519(k) => k.verifying_key().to_bytes().to_vec(),
            Inner::EcdsaP256(k) => {
                P256VerifyingKey::from(k).to_encoded_point(true).as_bytes().to_vec()
            }
        }
    }

    /// Deterministic `NodeId` derived from the public half.
    pub fn node_id(&self) -> NodeId {
        NodeId::from_public_key_bytes(&self.public_key_bytes())
    }

    /// Sign a message with the private half.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.inner {
            Inner::Ed25519(k) => k.sign(message).to_bytes().to_vec(),
            Inner::EcdsaP256(k) => {
                let sig: p256::ecdsa::Signature = k.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
        }
    }

    /// Verify a signature produced by [`KeyPair::sign`] against a raw
    /// public key of the matching type.
    pub fn verify(
        key_type: KeyType,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), IdentityError> {
        match key_type {
            KeyType::Ed25519 => {
                let vk_bytes: [u8; 32] = public_key
                    .try_into()
                    .map_err(|_| IdentityError::InvalidKeyLength {
                        expected: 32,
                        actual: public_key.len(),
                    })?;
                let vk = VerifyingKey::from_bytes(&vk_bytes)
                    .map_err(|e| IdentityError::MalformedPem(e.to_string()))?;
                let sig_bytes: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| IdentityError::InvalidKeyLength {
                        expected: 64,
                        actual: signature.len(),
                    })?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                vk.verify_strict(message, &sig)
                    .map_err(|_| IdentityError::SignatureVerificationFailed)
            }
            KeyType::EcdsaP256 => {
                use p256::ecdsa::signature::Verifier;
                let vk = P256VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|e| IdentityError::MalformedPem(e.to_string()))?;
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| IdentityError::SignatureVerificationFailed)?;
                vk.verify(message, &sig)
                    .map_err(|_| IdentityError::SignatureVerificationFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_node_id_is_deterministic() {
        let kp = KeyPair::generate_ed25519();
        assert_eq!(kp.node_id(), kp.node_id());
    }

    #[test]
    fn ed25519_pem_roundtrip() {
        let kp = KeyPair::generate_ed25519();
        let pem_str = kp.to_pem();
        let reloaded = KeyPair::from_pem_str(&pem_str).unwrap();
        assert_eq!(kp.node_id(), reloaded.node_id());
        assert_eq!(kp.key_type(), KeyType::Ed25519);
    }

    #[test]
    fn ecdsa_p256_pem_roundtrip() {
        let kp = KeyPair::generate_ecdsa_p256();
        let pem_str = kp.to_pem();
        let reloaded = KeyPair::from_pem_str(&pem_str).unwrap();
        assert_eq!(kp.node_id(), reloaded.node_id());
        assert_eq!(kp.key_type(), KeyType::EcdsaP256);
    }

    #[test]
    fn sign_and_verify_roundtrip_ed25519() {
        let kp = KeyPair::generate_ed25519();
        let msg = b"dep2p realm challenge";
        let sig = kp.sign(msg);
        KeyPair::verify(KeyType::Ed25519, &kp.public_key_bytes(), msg, &sig).unwrap();
    }

    #[test]
    fn sign_and_verify_roundtrip_p256() {
        let kp = KeyPair::generate_ecdsa_p256();
        let msg = b"dep2p realm challenge";
        let sig = kp.sign(msg);
        KeyPair::verify(KeyType::EcdsaP256, &kp.public_key_bytes(), msg, &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::generate_ed25519();
        let sig = kp.sign(b"original");
        let result = KeyPair::verify(KeyType::Ed25519, &kp.public_key_bytes(), b"tampered", &sig);
        assert!(result.is_err());
    }

    #[test]
    fn different_keypairs_produce_different_node_ids() {
        let a = KeyPair::generate_ed25519();
        let b = KeyPair::generate_ed25519();
        assert_ne!(a.node_id(), b.node_id());
    }
}
