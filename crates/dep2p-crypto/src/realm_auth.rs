//! HMAC-SHA256 challenge/response proof-of-membership.
//!
//! This is the cryptographic core behind the wire protocol
//! `/dep2p/sys/realm-auth/1.0.0`: the server hands the connecting peer a
//! random challenge, the peer proves it knows the Realm's pre-shared key
//! by HMACing the challenge, and the server checks the result in
//! constant time so a mistimed comparison can't leak key material bit by
//! bit. None of the functions here touch a socket — the stream framing
//! that carries these bytes lives in the realm layer above.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use dep2p_core::RealmKey;

use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Byte length of both the challenge and the proof.
pub const CHALLENGE_LEN: usize = 32;

/// Generate a fresh 32-byte random challenge for an inbound RealmAuth
/// handshake.
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}

/// Compute `HMAC-SHA256(RealmKey, challenge)`, the proof a client sends
/// back to demonstrate knowledge of the Realm's key.
pub fn compute_proof(key: &RealmKey, challenge: &[u8]) -> CryptoResult<[u8; CHALLENGE_LEN]> {
    if challenge.len() != CHALLENGE_LEN {
        return Err(CryptoError::InvalidChallengeLength(challenge.len()));
    }
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts a key of any length");
    mac.update(challenge);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; CHALLENGE_LEN];
    out.copy_from_slice(&result);
    Ok(out)
}

/// Recompute the expected proof and compare it against what the peer
/// sent, in constant time.
pub fn verify_proof(key: &RealmKey, challenge: &[u8], proof: &[u8]) -> CryptoResult<()> {
    if proof.len() != CHALLENGE_LEN {
        return Err(CryptoError::InvalidProofLength(proof.len()));
    }
    let expected = compute_proof(key, challenge)?;
    if expected.ct_eq(proof).into() {
        Ok(())
    } else {
        Err(CryptoError::AuthFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_verifies() {
        let key = RealmKey::from_passphrase("shared-secret");
        let challenge = generate_challenge();
        let proof = compute_proof(&key, &challenge).unwrap();
        assert!(verify_proof(&key, &challenge, &proof).is_ok());
    }

    #[test]
    fn wrong_key_fails() {
        let key = RealmKey::from_passphrase("shared-secret");
        let other = RealmKey::from_passphrase("different-secret");
        let challenge = generate_challenge();
        let proof = compute_proof(&key, &challenge).unwrap();
        assert!(matches!(
            verify_proof(&other, &challenge, &proof),
            Err(CryptoError::AuthFailed)
        ));
    }

    #[test]
    fn tampered_proof_fails() {
        let key = RealmKey::from_passphrase("shared-secret");
        let challenge = generate_challenge();
        let mut proof = compute_proof(&key, &challenge).unwrap();
        proof[0] ^= 0xff;
        assert!(matches!(
            verify_proof(&key, &challenge, &proof),
            Err(CryptoError::AuthFailed)
        ));
    }

    #[test]
    fn challenges_are_not_constant() {
        let a = generate_challenge();
        let b = generate_challenge();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_wrong_length_proof() {
        let key = RealmKey::from_passphrase("shared-secret");
        let challenge = generate_challenge();
        assert!(matches!(
            verify_proof(&key, &challenge, &[0u8; 16]),
            Err(CryptoError::InvalidProofLength(16))
        ));
    }
}
