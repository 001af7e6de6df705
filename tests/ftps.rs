//! Encrypted transport modes against in-process servers.
//!
//! The TLS server uses a freshly generated self-signed certificate, so every
//! profile here turns certificate verification off.

mod common;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use common::{FakeFtpServer, Tree, PASSWORD, USER};
use report_chat::fetch::{fetch, FetchError, FetchOptions};
use report_chat::ftp::tls::TlsVersion;
use report_chat::ftp::FtpError;
use report_chat::transport::{ConnectionProfile, Connector, FtpConnector, TransportMode};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};

fn profile(port: u16, mode: TransportMode) -> ConnectionProfile {
    ConnectionProfile {
        host: "127.0.0.1".into(),
        port,
        username: USER.into(),
        password: PASSWORD.into(),
        base_path: "/".into(),
        mode,
        tls_version: TlsVersion::Any,
        verify_certificate: false,
    }
}

fn options() -> FetchOptions {
    FetchOptions::new(false, "2025", &["*.csv".to_string()]).unwrap()
}

fn server_config() -> Arc<ServerConfig> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = generated.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert], key)
    .unwrap();
    Arc::new(config)
}

/// One CRLF-terminated command, read a byte at a time so nothing past the
/// line is consumed. `None` once the peer is gone.
fn read_command(stream: &mut impl Read) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
        }
    }
    Some(String::from_utf8_lossy(&line).trim_end().to_string())
}

fn reply(stream: &mut impl Write, line: &str) {
    let _ = stream.write_all(format!("{}\r\n", line).as_bytes());
    let _ = stream.flush();
}

/// How the TLS server starts the session.
#[derive(Clone, Copy)]
enum Entry {
    /// Plain greeting, then `AUTH TLS` upgrades the control connection.
    Explicit,
    /// Handshake first, greeting inside TLS.
    Implicit,
}

/// A single-connection FTPS control server that answers login and data
/// channel setup, replying to `PROT` with `prot_reply`.
struct TlsFtpServer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
}

impl TlsFtpServer {
    fn start(entry: Entry, prot_reply: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let config = server_config();

        let log = Arc::clone(&commands);
        thread::spawn(move || {
            let Ok((mut tcp, _)) = listener.accept() else {
                return;
            };

            if let Entry::Explicit = entry {
                reply(&mut tcp, "220 explicit FTPS ready");
                let Some(auth) = read_command(&mut tcp) else {
                    return;
                };
                log.lock().unwrap().push(auth.clone());
                if auth != "AUTH TLS" {
                    reply(&mut tcp, "504 unsupported mechanism");
                    return;
                }
                reply(&mut tcp, "234 proceed with negotiation");
            }

            let connection = ServerConnection::new(config).unwrap();
            let mut tls = StreamOwned::new(connection, tcp);
            if let Entry::Implicit = entry {
                reply(&mut tls, "220 implicit FTPS ready");
            }

            serve_secured(&mut tls, prot_reply, &log);
        });

        Self { port, commands }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

fn serve_secured(
    tls: &mut StreamOwned<ServerConnection, TcpStream>,
    prot_reply: &str,
    log: &Mutex<Vec<String>>,
) {
    while let Some(command) = read_command(tls) {
        log.lock().unwrap().push(command.clone());
        let verb = command.split(' ').next().unwrap_or("").to_ascii_uppercase();
        match verb.as_str() {
            "USER" => reply(tls, "331 password required"),
            "PASS" if command == format!("PASS {}", PASSWORD) => reply(tls, "230 logged in"),
            "PASS" => reply(tls, "530 login incorrect"),
            "PBSZ" => reply(tls, "200 PBSZ=0"),
            "PROT" => reply(tls, prot_reply),
            "TYPE" => reply(tls, "200 type set"),
            "QUIT" => {
                reply(tls, "221 bye");
                break;
            }
            _ => reply(tls, "502 command not implemented"),
        }
    }
}

#[test]
fn test_refused_auth_ssl_is_a_handshake_error() {
    let server = FakeFtpServer::start(Tree::new());

    let err = fetch(
        &profile(server.port, TransportMode::ExplicitTlsAuthSsl),
        &options(),
    )
    .unwrap_err();

    assert!(
        matches!(err, FetchError::Handshake { source: FtpError::Rejected(ref reply), .. } if reply.code == 502),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(err.kind(), "tls handshake");
    assert_eq!(server.commands_with("AUTH"), ["AUTH SSL"]);
    // Never logged in over the plain connection.
    assert!(server.commands_with("USER").is_empty());
}

#[test]
fn test_refused_auth_tls_is_a_handshake_error() {
    let server = FakeFtpServer::start(Tree::new());

    let err = fetch(&profile(server.port, TransportMode::ExplicitTls), &options()).unwrap_err();

    assert!(matches!(err, FetchError::Handshake { .. }));
    assert_eq!(server.commands_with("AUTH"), ["AUTH TLS"]);
}

#[test]
fn test_explicit_tls_refusing_protected_data_is_a_config_error() {
    let server = TlsFtpServer::start(Entry::Explicit, "534 protection level not supported");

    let err = fetch(&profile(server.port, TransportMode::ExplicitTls), &options()).unwrap_err();

    assert!(
        matches!(err, FetchError::Config(ref message) if message.contains("plain text")),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(err.kind(), "configuration");

    let commands = server.commands();
    assert_eq!(commands[0], "AUTH TLS");
    assert!(commands.iter().any(|c| c == "PBSZ 0"));
    assert!(commands.iter().any(|c| c == "PROT P"));
    // Nothing is listed or downloaded without a protected data channel.
    assert!(!commands.iter().any(|c| c.starts_with("PASV") || c.starts_with("NLST")));
}

#[test]
fn test_implicit_tls_session_protects_data_channel() {
    let server = TlsFtpServer::start(Entry::Implicit, "200 protection level set");

    let session = FtpConnector
        .open(&profile(server.port, TransportMode::ImplicitTls))
        .unwrap();
    assert!(session.is_data_protected());
    drop(session);

    // The greeting and every command travelled inside TLS.
    let commands = server.commands();
    assert_eq!(
        commands[..5],
        [
            format!("USER {}", USER),
            format!("PASS {}", PASSWORD),
            "PBSZ 0".to_string(),
            "PROT P".to_string(),
            "TYPE I".to_string(),
        ]
    );
}
