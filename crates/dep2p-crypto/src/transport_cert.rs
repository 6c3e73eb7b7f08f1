//! Self-signed TLS certificates used by the QUIC/TCP security handshake.
//!
//! dep2p does not rely on a certificate authority: every node mints its
//! own short-lived, self-signed leaf certificate and binds its NodeID
//! into it as a Subject Alternative Name so the peer on the other end of
//! the handshake can read it straight off the presented certificate
//! instead of exchanging identity out of band.

use rcgen::{CertificateParams, DistinguishedName, KeyPair as RcgenKeyPair, SanType};

use dep2p_core::NodeId;

use crate::error::{CryptoError, CryptoResult};

/// A self-signed leaf certificate plus the private key that signed it,
/// ready to hand to `rustls`/`quinn` as the local TLS identity.
pub struct SelfSignedCert {
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

/// Generate a fresh self-signed certificate binding `node_id` into its
/// SAN list as `dep2p://<base58 node id>`.
pub fn generate_self_signed_cert(node_id: &NodeId) -> CryptoResult<SelfSignedCert> {
    let key_pair = RcgenKeyPair::generate()
        .map_err(|e| CryptoError::CertificateGeneration(e.to_string()))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| CryptoError::CertificateGeneration(e.to_string()))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .subject_alt_names
        .push(SanType::URI(format!("dep2p://{node_id}").try_into().map_err(
            |_| CryptoError::CertificateGeneration("invalid SAN URI".into()),
        )?));

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CryptoError::CertificateGeneration(e.to_string()))?;

    Ok(SelfSignedCert {
        cert_der: cert.der().to_vec(),
        key_der: key_pair.serialize_der(),
    })
}

/// Extract the `dep2p://<node id>` SAN URI embedded by
/// [`generate_self_signed_cert`] and parse it back into a [`NodeId`].
///
/// This is a best-effort textual scan of the DER, not full ASN.1
/// parsing; it is sufficient to recover the identity claim carried by a
/// certificate this crate itself produced.
pub fn node_id_from_cert_der(der: &[u8]) -> CryptoResult<NodeId> {
    let text = String::from_utf8_lossy(der);
    let marker = "dep2p://";
    let start = text
        .find(marker)
        .ok_or_else(|| CryptoError::CertificateParse("no dep2p SAN found".into()))?
        + marker.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let candidate = &rest[..end];
    NodeId::from_base58(candidate)
        .map_err(|e| CryptoError::CertificateParse(format!("malformed node id in SAN: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep2p_core::KeyPair;

    #[test]
    fn generated_cert_round_trips_node_id() {
        let kp = KeyPair::generate_ed25519();
        let node_id = kp.node_id();
        let cert = generate_self_signed_cert(&node_id).unwrap();
        let recovered = node_id_from_cert_der(&cert.cert_der).unwrap();
        assert_eq!(node_id, recovered);
    }

    #[test]
    fn distinct_nodes_produce_distinct_certs() {
        let a = KeyPair::generate_ed25519().node_id();
        let b = KeyPair::generate_ed25519().node_id();
        let cert_a = generate_self_signed_cert(&a).unwrap();
        let cert_b = generate_self_signed_cert(&b).unwrap();
        assert_ne!(cert_a.cert_der, cert_b.cert_der);
    }
}
