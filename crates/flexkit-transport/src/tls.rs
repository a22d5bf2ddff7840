//! TLS upgrade for relayed command channels.
//!
//! Relay sessions are secured with TLS immediately after the raw TCP
//! connect. Relay endpoints commonly present self-signed certificates, so
//! certificate trust is delegated to a caller-supplied [`TrustPolicy`]; the
//! default, [`AcceptAnyCertificate`], trusts every peer. Handshake signatures
//! are still verified with the crypto provider's algorithms.

use std::fmt;
use std::sync::Arc;

use flexkit_core::error::{Error, Result};
use flexkit_core::transport::BoxedStream;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

/// Decides whether a relay endpoint's certificate is trusted.
pub trait TrustPolicy: fmt::Debug + Send + Sync {
    /// Return `true` to accept `end_entity` (DER) presented by `server_name`.
    fn trust(&self, server_name: &str, end_entity: &[u8]) -> bool;
}

/// Trust every certificate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyCertificate;

impl TrustPolicy for AcceptAnyCertificate {
    fn trust(&self, _server_name: &str, _end_entity: &[u8]) -> bool {
        true
    }
}

/// Adapts a [`TrustPolicy`] to rustls' verifier interface.
#[derive(Debug)]
struct PolicyVerifier {
    policy: Arc<dyn TrustPolicy>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let name = server_name.to_str();
        if self.policy.trust(&name, end_entity.as_ref()) {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::debug!(server = %name, "Certificate rejected by trust policy");
            Err(rustls::Error::General(format!(
                "certificate for {name} rejected by trust policy"
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build a TLS connector whose certificate trust is decided by `policy`.
pub fn connector(policy: Arc<dyn TrustPolicy>) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PolicyVerifier {
        policy,
        provider: Arc::clone(&provider),
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Run a TLS client handshake over `stream`.
pub async fn upgrade(
    connector: &TlsConnector,
    stream: BoxedStream,
    server_name: &str,
) -> Result<BoxedStream> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name {server_name}: {e}")))?;

    tracing::debug!(server = %server_name, "Starting TLS handshake");
    let tls = connector
        .connect(name, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;
    tracing::debug!(server = %server_name, "TLS handshake complete");

    Ok(Box::new(tls))
}
