//! Transport strategies for reaching the report server.
//!
//! A [`Connector`] opens a logged-in [`RemoteSession`] for a
//! [`ConnectionProfile`]. The fetch pipeline only talks to these two traits,
//! so every handshake variant shares one pipeline and tests can substitute
//! an in-memory server.
//!
//! # Transport modes
//!
//! | Mode | Handshake | Data channel |
//! |------|-----------|--------------|
//! | `plain` | none | plain |
//! | `explicit-tls` | `AUTH TLS` on port 21 | `PROT P` |
//! | `explicit-tls-auth-ssl` | legacy `AUTH SSL` on port 21 | `PROT P` |
//! | `implicit-tls` | TLS on connect, port 990 | `PROT P` |
//!
//! Encrypted modes refuse to continue if the server rejects `PBSZ`/`PROT`;
//! reports are never transferred in plain text over an encrypted session.

use serde::Deserialize;
use tracing::{info, warn};

use crate::fetch::FetchError;
use crate::ftp::tls::{TlsContext, TlsVersion};
use crate::ftp::{self, AuthMechanism, FtpError, FtpStream};

/// Handshake / encryption variant used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    #[default]
    Plain,
    ExplicitTls,
    ExplicitTlsAuthSsl,
    ImplicitTls,
}

impl TransportMode {
    pub fn default_port(self) -> u16 {
        match self {
            TransportMode::ImplicitTls => 990,
            _ => 21,
        }
    }

    pub fn is_encrypted(self) -> bool {
        self != TransportMode::Plain
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Plain => "plain",
            TransportMode::ExplicitTls => "explicit-tls",
            TransportMode::ExplicitTlsAuthSsl => "explicit-tls-auth-ssl",
            TransportMode::ImplicitTls => "implicit-tls",
        }
    }
}

/// Everything needed to open one session. Immutable once built.
#[derive(Clone)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub base_path: String,
    pub mode: TransportMode,
    pub tls_version: TlsVersion,
    pub verify_certificate: bool,
}

impl ConnectionProfile {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("base_path", &self.base_path)
            .field("mode", &self.mode)
            .field("tls_version", &self.tls_version)
            .field("verify_certificate", &self.verify_certificate)
            .finish()
    }
}

/// An authenticated session with the remote file server.
pub trait RemoteSession {
    /// Enter `path` (absolute, or relative to the current directory).
    fn change_dir(&mut self, path: &str) -> Result<(), FtpError>;

    /// Absolute path of the current directory.
    fn current_dir(&mut self) -> Result<String, FtpError>;

    /// Entry names of the current directory, in server order.
    fn list(&mut self) -> Result<Vec<String>, FtpError>;

    /// Download a file of the current directory into memory.
    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, FtpError>;

    /// End the session.
    fn close(self) -> Result<(), FtpError>
    where
        Self: Sized;
}

/// Opens [`RemoteSession`]s for a profile.
pub trait Connector {
    type Session: RemoteSession;

    fn open(&self, profile: &ConnectionProfile) -> Result<Self::Session, FetchError>;
}

/// The FTP/FTPS connector, dispatching on [`ConnectionProfile::mode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpConnector;

impl Connector for FtpConnector {
    type Session = FtpStream;

    fn open(&self, profile: &ConnectionProfile) -> Result<FtpStream, FetchError> {
        let address = profile.address();
        info!("connecting to {} ({})", address, profile.mode.as_str());

        let tls = if profile.mode.is_encrypted() {
            if !profile.verify_certificate {
                warn!(
                    "certificate verification is disabled for {}; the connection is not authenticated",
                    profile.host
                );
            }
            let context =
                TlsContext::new(&profile.host, profile.tls_version, profile.verify_certificate)
                    .map_err(|e| FetchError::Config(format!("TLS setup failed: {}", e)))?;
            Some(context)
        } else {
            None
        };

        let tcp = ftp::connect_tcp(&profile.host, profile.port).map_err(|source| {
            FetchError::Connect {
                address: address.clone(),
                source,
            }
        })?;

        let handshake = |source: FtpError| FetchError::Handshake {
            host: profile.host.clone(),
            source,
        };

        let mut stream = match (profile.mode, tls) {
            (TransportMode::Plain, _) => {
                FtpStream::plain(tcp).map_err(|source| FetchError::Connect {
                    address: address.clone(),
                    source,
                })?
            }
            (TransportMode::ExplicitTls, Some(tls)) => FtpStream::plain(tcp)
                .and_then(|s| s.secure(AuthMechanism::Tls, tls))
                .map_err(handshake)?,
            (TransportMode::ExplicitTlsAuthSsl, Some(tls)) => FtpStream::plain(tcp)
                .and_then(|s| s.secure(AuthMechanism::Ssl, tls))
                .map_err(handshake)?,
            (TransportMode::ImplicitTls, Some(tls)) => {
                FtpStream::implicit(tcp, tls).map_err(handshake)?
            }
            (mode, None) => {
                return Err(FetchError::Config(format!(
                    "transport mode '{}' requires TLS",
                    mode.as_str()
                )))
            }
        };

        stream
            .login(&profile.username, &profile.password)
            .map_err(|e| match e {
                FtpError::Rejected(reply) => FetchError::Auth {
                    user: profile.username.clone(),
                    reply,
                },
                other => FetchError::Transport(other),
            })?;

        if profile.mode.is_encrypted() {
            stream.protect_data_channel().map_err(|e| match e {
                FtpError::Rejected(reply) => FetchError::Config(format!(
                    "server refused a protected data channel ({}); refusing to transfer reports in plain text",
                    reply
                )),
                other => FetchError::Transport(other),
            })?;
        }

        stream.binary()?;
        info!("logged in to {} as {}", address, profile.username);
        Ok(stream)
    }
}

impl RemoteSession for FtpStream {
    fn change_dir(&mut self, path: &str) -> Result<(), FtpError> {
        self.cwd(path)
    }

    fn current_dir(&mut self) -> Result<String, FtpError> {
        self.pwd()
    }

    fn list(&mut self) -> Result<Vec<String>, FtpError> {
        self.nlst()
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, FtpError> {
        self.retr(name)
    }

    fn close(self) -> Result<(), FtpError> {
        self.quit()
    }
}
