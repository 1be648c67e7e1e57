//! QUIC endpoint plumbing: the sender listens, the receiver dials.
//!
//! The channel is encrypted by QUIC's TLS layer with a throwaway
//! self-signed certificate; possession of the ticket is the only
//! authentication, so the receiver accepts any server certificate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio_util::sync::CancellationToken;

use crate::config::{DIAL_ATTEMPT_TIMEOUT, DIAL_RETRY_DELAY};
use crate::error::{Result, TransferError};

const ALPN: &[u8] = b"beam/1";
const SERVER_NAME: &str = "beam";

fn generate_self_signed_cert()
-> Result<(Vec<CertificateDer<'static>>, PrivatePkcs8KeyDer<'static>)> {
    let certified_key = generate_simple_self_signed(vec![SERVER_NAME.to_string()])?;
    let key = PrivatePkcs8KeyDer::from(certified_key.signing_key.serialize_der());
    let cert_der = CertificateDer::from(certified_key.cert.der().to_vec());
    Ok((vec![cert_der], key))
}

fn transport_config() -> TransportConfig {
    let mut transport = TransportConfig::default();
    // No liveness policy on an in-progress transfer: a stalled session is
    // left to external supervision. Keep-alives only keep NAT bindings warm.
    transport.max_idle_timeout(None);
    transport.keep_alive_interval(Some(Duration::from_secs(2)));
    transport.stream_receive_window((10u32 * 1024 * 1024).into());
    transport.receive_window((20u32 * 1024 * 1024).into());
    transport.send_window(20 * 1024 * 1024);
    transport
}

/// Create the sender's listening endpoint.
pub fn make_sender_endpoint(bind_addr: SocketAddr) -> Result<Endpoint> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (certs, key) = generate_self_signed_cert()?;
    let mut server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key.into())?;
    server_crypto.alpn_protocols = vec![ALPN.to_vec()];

    let mut server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
            .map_err(|e| TransferError::Tls(e.to_string()))?,
    ));
    server_config.transport_config(Arc::new(transport_config()));

    Ok(Endpoint::server(server_config, bind_addr)?)
}

/// Create the receiver's dialing endpoint.
pub fn make_receiver_endpoint() -> Result<Endpoint> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let mut client_config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransferError::Tls(e.to_string()))?,
    ));
    client_config.transport_config(Arc::new(transport_config()));

    let mut endpoint = Endpoint::client("0.0.0.0:0".parse().expect("wildcard addr parses"))?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}

/// Wait for exactly one peer, then turn every later connection attempt
/// away for the life of the endpoint.
pub async fn accept_one(
    endpoint: &Endpoint,
    cancel: &CancellationToken,
) -> Result<quinn::Connection> {
    let incoming = tokio::select! {
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        incoming = endpoint.accept() => incoming
            .ok_or_else(|| TransferError::Protocol("listening endpoint closed".into()))?,
    };

    let connection = tokio::select! {
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        conn = incoming => conn?,
    };

    let refusing = endpoint.clone();
    tokio::spawn(async move {
        while let Some(later) = refusing.accept().await {
            tracing::debug!(remote = %later.remote_address(), "refusing second connection");
            later.refuse();
        }
    });

    Ok(connection)
}

/// Dial the sender's endpoint, retrying while it is not yet listening.
///
/// Silence retries on a fixed delay until the deadline; an explicit
/// refusal fails immediately since the sender is alive but already serving.
pub async fn dial(
    endpoint: &Endpoint,
    addr: SocketAddr,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<quinn::Connection> {
    let started = Instant::now();

    loop {
        let remaining = deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or(TransferError::ConnectTimeout(deadline))?;

        let connecting = endpoint.connect(addr, SERVER_NAME)?;
        let attempt = tokio::time::timeout(remaining.min(DIAL_ATTEMPT_TIMEOUT), connecting);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(Ok(connection)) => return Ok(connection),
            Ok(Err(e)) if is_refusal(&e) => return Err(TransferError::ConnectRefused(addr)),
            Ok(Err(e)) => tracing::debug!(%addr, "dial attempt failed: {}", e),
            Err(_) => tracing::debug!(%addr, "dial attempt got no answer"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            _ = tokio::time::sleep(DIAL_RETRY_DELAY) => {}
        }
    }
}

fn is_refusal(e: &quinn::ConnectionError) -> bool {
    matches!(
        e,
        quinn::ConnectionError::ConnectionClosed(_)
            | quinn::ConnectionError::ApplicationClosed(_)
            | quinn::ConnectionError::Reset
    )
}

/// Accepts any server certificate; the ticket is the trust anchor.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
