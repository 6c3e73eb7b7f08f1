//! TLS configuration shared by the QUIC transport and the TCP fallback's
//! security-upgrade step.
//!
//! dep2p has no certificate authority: every node signs its own leaf
//! certificate and binds its NodeID into it (see
//! `dep2p_crypto::transport_cert`). The security handshake's job is
//! narrower than a browser's — it fixes *which* NodeID the socket on the
//! other end claims and encrypts the link; RealmAuth (a layer up) is
//! what actually proves membership before any application data flows.
//! Both sides therefore accept any self-signed certificate for the
//! handshake itself and read the peer's claimed NodeID back out of it.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivatePkcsKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};

use dep2p_core::NodeId;
use dep2p_crypto::{generate_self_signed_cert, node_id_from_cert_der};

use crate::error::{TransportError, TransportResult};

/// Accepts every self-signed certificate without checking a CA chain.
/// Identity binding happens by reading the NodeID claim back out of the
/// certificate, not by trust-chain validation.
#[derive(Debug)]
pub struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ED25519,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}

impl ClientCertVerifier for AcceptAnyCert {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ED25519,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}

/// The DER-encoded certificate and private key a node presents for every
/// connection it dials or accepts, plus the local NodeID it binds in.
pub struct NodeIdentityCert {
    pub node_id: NodeId,
    pub cert_der: CertificateDer<'static>,
    pub key_der: PrivatePkcsKeyDer<'static>,
}

pub fn generate_node_identity_cert(node_id: NodeId) -> TransportResult<NodeIdentityCert> {
    let generated = generate_self_signed_cert(&node_id)
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    Ok(NodeIdentityCert {
        node_id,
        cert_der: CertificateDer::from(generated.cert_der),
        key_der: PrivatePkcsKeyDer::from(generated.key_der),
    })
}

/// Extract the NodeID a peer claimed in the certificate it presented
/// during the handshake just completed.
pub fn remote_node_id_from_cert(cert: &CertificateDer<'_>) -> TransportResult<NodeId> {
    node_id_from_cert_der(cert.as_ref())
        .map_err(|e| TransportError::HandshakeFailed(format!("unreadable peer identity: {e}")))
}

/// Build a rustls client+server config pair sharing one identity
/// certificate, suitable for QUIC's single-handshake model where both
/// ends authenticate each other.
pub fn build_rustls_configs(
    identity: &NodeIdentityCert,
) -> TransportResult<(Arc<rustls::ClientConfig>, Arc<rustls::ServerConfig>)> {
    let cert_chain = vec![identity.cert_der.clone()];
    let key = identity.key_der.clone_key();

    let mut client_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_client_auth_cert(cert_chain.clone(), key.clone_key().into())
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    client_config.alpn_protocols = vec![b"dep2p/1".to_vec()];

    let mut server_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(Arc::new(AcceptAnyCert))
        .with_single_cert(cert_chain, key.into())
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
    server_config.alpn_protocols = vec![b"dep2p/1".to_vec()];

    Ok((Arc::new(client_config), Arc::new(server_config)))
}
