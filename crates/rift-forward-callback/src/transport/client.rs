//! Shared HTTP client construction.
//!
//! One pooled client is built per transport and cloned into every call.

use crate::config::ConnectionPoolConfig;
use anyhow::Context;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Type alias for the HTTP client used for upstream calls.
pub type HttpClient =
    Client<hyper_rustls::HttpsConnector<HttpConnector>, BoxBody<Bytes, hyper::Error>>;

/// Certificate verifier for upstreams with self-signed certificates.
///
/// The certificate chain and server name are trusted unconditionally, while
/// handshake signatures are still checked against the ring provider's
/// algorithms so the peer must hold the key it presents.
///
/// # Warning
/// This disables certificate trust checks - use only in development!
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyCertificate {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Create a pooled HTTP/1.1 client that speaks both http and https.
pub fn create_http_client(
    pool: &ConnectionPoolConfig,
    skip_tls_verify: bool,
) -> anyhow::Result<HttpClient> {
    // Both ring and aws-lc-rs are compiled in, so pick one explicitly. An
    // error only means another component installed a provider first.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false);

    let https_connector = if skip_tls_verify {
        warn!("TLS certificate verification DISABLED for forwarded requests (development/testing only)");
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(
                rustls::ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new()))
                    .with_no_client_auth(),
            )
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    } else {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native root certificates")?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    };

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    info!(
        "Forward client pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s, connect_timeout={}s",
        pool.max_idle_per_host,
        pool.idle_timeout_secs,
        pool.keepalive_timeout_secs,
        pool.connect_timeout_secs
    );

    Ok(client)
}
