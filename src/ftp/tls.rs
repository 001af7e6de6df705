//! TLS client configuration for FTPS control and data channels.
//!
//! Built on `rustls` with the `ring` provider so the binary carries no
//! OpenSSL or other C TLS library. Trust anchors come from `webpki-roots`.
//!
//! Two knobs are exposed, matching what FTPS servers in the field require:
//!
//! | Knob | Values |
//! |------|--------|
//! | Protocol version | any supported, TLS 1.2 only, TLS 1.3 only |
//! | Certificate verification | verify against webpki roots, or skip |
//!
//! Skipping verification accepts any certificate for any name. It exists
//! for servers with self-signed certificates and is insecure.

use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use serde::Deserialize;

use super::FtpError;

pub(crate) type TlsStream = StreamOwned<ClientConnection, TcpStream>;

static TLS12_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// TLS protocol version pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TlsVersion {
    /// Negotiate any version the provider supports (TLS 1.2 or 1.3).
    #[default]
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl TlsVersion {
    fn protocol_versions(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        match self {
            TlsVersion::Any => rustls::ALL_VERSIONS,
            TlsVersion::Tls12 => TLS12_ONLY,
            TlsVersion::Tls13 => TLS13_ONLY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TlsVersion::Any => "any",
            TlsVersion::Tls12 => "1.2",
            TlsVersion::Tls13 => "1.3",
        }
    }
}

/// Client configuration plus the server name, shared by the control channel
/// and every data channel of one session so data connections can resume the
/// control channel's TLS session.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

impl TlsContext {
    pub fn new(host: &str, version: TlsVersion, verify_certificate: bool) -> Result<Self, FtpError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(version.protocol_versions())?;

        let config = if verify_certificate {
            let roots = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
                .with_no_client_auth()
        };

        let server_name = ServerName::try_from(host)
            .map(|name| name.to_owned())
            .map_err(|_| FtpError::ServerName(host.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            server_name,
        })
    }

    /// Run a full client handshake over `tcp`.
    pub(crate) fn wrap(&self, tcp: TcpStream) -> Result<TlsStream, FtpError> {
        let connection = ClientConnection::new(self.config.clone(), self.server_name.clone())?;
        let mut stream = StreamOwned::new(connection, tcp);
        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock)?;
        }
        Ok(stream)
    }
}

/// Verifier used when certificate verification is switched off.
///
/// Handshake signatures are still checked so the peer must hold the key of
/// the certificate it presents; only the chain and name checks are skipped.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
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
        rustls::crypto::verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
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
