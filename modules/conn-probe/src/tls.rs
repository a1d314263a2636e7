//! TLS handshake against proxy frontends. Certificates are not verified:
//! self-signed and mismatched certificates are routine on these endpoints and
//! do not make a node unusable.

use anyhow::{anyhow, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

#[derive(Debug)]
struct NoVerify {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
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
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

pub(crate) fn connector() -> Result<TlsConnector, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerify { provider }))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Build the SNI value; IP literals become IP server names.
pub(crate) fn server_name(name: &str) -> Result<ServerName<'static>> {
    let name = name.trim_start_matches('[').trim_end_matches(']');
    match name.parse::<std::net::IpAddr>() {
        Ok(ip) => Ok(ServerName::IpAddress(ip.into())),
        Err(_) => ServerName::try_from(name.to_owned()).map_err(|_| anyhow!("invalid server name: {}", name)),
    }
}

/// Run a handshake over an established stream and summarise what was negotiated.
pub(crate) async fn handshake(
    connector: &TlsConnector,
    stream: TcpStream,
    sni: &str,
    limit: Duration,
) -> Result<String> {
    let server_name = server_name(sni)?;
    let tls = timeout(limit, connector.connect(server_name, stream))
        .await
        .map_err(|_| anyhow!("handshake timed out after {} ms", limit.as_millis()))??;
    let (_, conn) = tls.get_ref();

    let version = conn
        .protocol_version()
        .map(|v| format!("{:?}", v))
        .unwrap_or_else(|| "unknown".into());
    let mut summary = match conn.negotiated_cipher_suite() {
        Some(suite) => format!("{} {:?}", version, suite.suite()),
        None => version,
    };
    if let Some(alpn) = conn.alpn_protocol() {
        summary.push_str(&format!(" | alpn={}", String::from_utf8_lossy(alpn)));
    }
    if let Some(end_entity) = conn.peer_certificates().and_then(|c| c.first()) {
        use x509_parser::prelude::*;
        if let Ok((_, x509)) = X509Certificate::from_der(end_entity.as_ref()) {
            let subj = x509.subject().iter_common_name().next().and_then(|cn| cn.as_str().ok()).unwrap_or("");
            let iss = x509.issuer().iter_common_name().next().and_then(|cn| cn.as_str().ok()).unwrap_or("");
            if !subj.is_empty() {
                summary.push_str(&format!(" | cert_cn={}", subj));
            }
            if !iss.is_empty() {
                summary.push_str(&format!(" / issuer_cn={}", iss));
            }
        }
    }
    Ok(summary)
}
