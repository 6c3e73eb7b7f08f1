//! RealmAuth wire protocol (`/dep2p/sys/realm-auth/1.0.0`, §4.5.1 and
//! §6): server hands out a 32-byte challenge, client proves knowledge of
//! the Realm key with an HMAC, server verifies in constant time.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use dep2p_core::RealmKey;
use dep2p_crypto::{compute_proof, generate_challenge, verify_proof, CHALLENGE_LEN};
use dep2p_transport::BoxedStream;

use crate::config::AuthConfig;
use crate::error::{RealmError, RealmResult};

/// Server side: issue a challenge, read back the proof, verify it.
/// Returns `Ok(())` exactly when the peer has proven knowledge of `key`.
pub async fn authenticate_inbound(
    stream: &mut BoxedStream,
    key: &RealmKey,
    cfg: &AuthConfig,
) -> RealmResult<()> {
    timeout(cfg.handshake_timeout, async {
        let challenge = generate_challenge();
        stream.write_all(&challenge).await.map_err(|_| RealmError::AuthFailed)?;

        let mut proof = [0u8; CHALLENGE_LEN];
        stream.read_exact(&mut proof).await.map_err(|_| RealmError::AuthFailed)?;

        verify_proof(key, &challenge, &proof).map_err(|_| RealmError::AuthFailed)
    })
    .await
    .map_err(|_| RealmError::Timeout)?
}

/// Client side: read the server's challenge, compute and send the proof.
pub async fn authenticate_outbound(
    stream: &mut BoxedStream,
    key: &RealmKey,
    cfg: &AuthConfig,
) -> RealmResult<()> {
    timeout(cfg.handshake_timeout, async {
        let mut challenge = [0u8; CHALLENGE_LEN];
        stream.read_exact(&mut challenge).await.map_err(|_| RealmError::AuthFailed)?;

        let proof = compute_proof(key, &challenge).map_err(|_| RealmError::AuthFailed)?;
        stream.write_all(&proof).await.map_err(|_| RealmError::AuthFailed)?;
        Ok(())
    })
    .await
    .map_err(|_| RealmError::Timeout)?
}
