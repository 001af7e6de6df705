//! Minimal FTP/FTPS client.
//!
//! Implements the subset of RFC 959 / RFC 4217 the report fetcher needs:
//! login, `CWD`, `PWD`, `NLST`, binary `RETR`, and `QUIT`, with passive-mode
//! data connections. Encryption is layered with [`tls::TlsContext`]:
//!
//! - **Explicit**: connect in plain text, send `AUTH TLS` (or the legacy
//!   `AUTH SSL`), then handshake on the control connection.
//! - **Implicit**: handshake immediately after the TCP connect.
//!
//! After login on an encrypted control channel, [`FtpStream::protect_data_channel`]
//! sends `PBSZ 0` and `PROT P`; from then on every data connection is
//! TLS-wrapped with the same client configuration.
//!
//! # Passive addresses
//!
//! The host in a `227` reply is ignored and the data connection goes to the
//! control connection's peer address with the advertised port. Servers behind
//! NAT routinely advertise private addresses.
//!
//! # Blocking I/O
//!
//! All I/O is blocking `std::net` with OS default timeouts; the client is
//! driven from one thread by one fetch at a time.

pub mod tls;

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;
use tracing::debug;

use tls::{TlsContext, TlsStream};

/// A complete server reply: three-digit code and the (possibly multi-line)
/// text that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("'{0}' is not a valid TLS server name")]
    ServerName(String),
    #[error("server replied {0}")]
    Rejected(Reply),
    #[error("malformed server reply: {0}")]
    Malformed(String),
}

impl FtpError {
    /// The server answered with a negative or unexpected reply; the
    /// connection itself is still usable.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FtpError::Rejected(_))
    }
}

/// Legacy servers only accept `AUTH SSL`; RFC 4217 servers accept `AUTH TLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Tls,
    Ssl,
}

impl AuthMechanism {
    fn command(self) -> &'static str {
        match self {
            AuthMechanism::Tls => "AUTH TLS",
            AuthMechanism::Ssl => "AUTH SSL",
        }
    }
}

/// A control or data connection, plain or TLS-wrapped.
enum Channel {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl Channel {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Channel::Plain(s) => s.peer_addr(),
            Channel::Tls(s) => s.sock.peer_addr(),
        }
    }

    /// Read until the peer closes. A TLS peer that drops the TCP connection
    /// without `close_notify` ends the transfer rather than failing it.
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match Read::read_to_end(self, &mut buf) {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(buf),
            Err(e) => Err(e),
        }
    }

    fn shutdown(self) {
        if let Channel::Tls(mut s) = self {
            s.conn.send_close_notify();
            let _ = s.conn.complete_io(&mut s.sock);
        }
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Channel::Plain(s) => s.read(buf),
            Channel::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Channel::Plain(s) => s.write(buf),
            Channel::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Channel::Plain(s) => s.flush(),
            Channel::Tls(s) => s.flush(),
        }
    }
}

/// Open the TCP control connection.
pub fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, FtpError> {
    Ok(TcpStream::connect((host, port))?)
}

/// One logged-in (or about to be) FTP session.
///
/// Dropping a stream that was not closed with [`quit`](FtpStream::quit)
/// still sends a best-effort `QUIT`.
pub struct FtpStream {
    control: BufReader<Channel>,
    tls: Option<TlsContext>,
    protected_data: bool,
    closed: bool,
}

impl FtpStream {
    /// Take over a plain TCP connection and read the server greeting.
    pub fn plain(tcp: TcpStream) -> Result<Self, FtpError> {
        let mut stream = Self::from_channel(Channel::Plain(tcp), None);
        stream.read_greeting()?;
        Ok(stream)
    }

    /// Handshake immediately (implicit FTPS), then read the greeting.
    pub fn implicit(tcp: TcpStream, tls: TlsContext) -> Result<Self, FtpError> {
        let secured = tls.wrap(tcp)?;
        let mut stream = Self::from_channel(Channel::Tls(Box::new(secured)), Some(tls));
        stream.read_greeting()?;
        Ok(stream)
    }

    fn from_channel(channel: Channel, tls: Option<TlsContext>) -> Self {
        Self {
            control: BufReader::new(channel),
            tls,
            protected_data: false,
            closed: false,
        }
    }

    /// Upgrade a plain control connection with `AUTH TLS` / `AUTH SSL`.
    pub fn secure(mut self, mechanism: AuthMechanism, tls: TlsContext) -> Result<Self, FtpError> {
        // 334 is what some legacy AUTH SSL implementations send instead of 234.
        self.expect(mechanism.command(), &[234, 334])?;

        if !self.control.buffer().is_empty() {
            return Err(FtpError::Malformed(
                "server sent data after accepting AUTH".to_string(),
            ));
        }

        let tcp = match self.control.get_ref() {
            Channel::Plain(tcp) => tcp.try_clone()?,
            Channel::Tls(_) => {
                return Err(FtpError::Malformed(
                    "control channel is already encrypted".to_string(),
                ))
            }
        };
        // The clone now owns the connection; the plain stream must not QUIT.
        self.closed = true;
        drop(self);

        let secured = tls.wrap(tcp)?;
        Ok(Self::from_channel(Channel::Tls(Box::new(secured)), Some(tls)))
    }

    /// `USER` / `PASS`. A `230` after `USER` means no password is needed.
    pub fn login(&mut self, user: &str, password: &str) -> Result<(), FtpError> {
        let reply = self.expect(&format!("USER {}", user), &[230, 331])?;
        if reply.code == 230 {
            return Ok(());
        }
        self.expect(&format!("PASS {}", password), &[230, 202])?;
        Ok(())
    }

    /// `PBSZ 0` + `PROT P`. Only valid on an encrypted control channel.
    pub fn protect_data_channel(&mut self) -> Result<(), FtpError> {
        if self.tls.is_none() {
            return Err(FtpError::Malformed(
                "data channel protection requires an encrypted control channel".to_string(),
            ));
        }
        self.expect("PBSZ 0", &[200])?;
        self.expect("PROT P", &[200])?;
        self.protected_data = true;
        Ok(())
    }

    pub fn is_data_protected(&self) -> bool {
        self.protected_data
    }

    /// Switch to image (binary) transfer type.
    pub fn binary(&mut self) -> Result<(), FtpError> {
        self.expect("TYPE I", &[200])?;
        Ok(())
    }

    pub fn cwd(&mut self, path: &str) -> Result<(), FtpError> {
        self.expect(&format!("CWD {}", path), &[250, 200])?;
        Ok(())
    }

    /// Current directory as reported by `PWD`.
    pub fn pwd(&mut self) -> Result<String, FtpError> {
        let reply = self.expect("PWD", &[257])?;
        parse_pwd(&reply.text)
            .ok_or_else(|| FtpError::Malformed(format!("cannot parse PWD reply: {}", reply)))
    }

    /// Names in the current directory, in server order.
    ///
    /// `450`/`550` on the listing itself is read as an empty directory; the
    /// directory was already entered successfully, and several servers
    /// answer an empty `NLST` this way.
    pub fn nlst(&mut self) -> Result<Vec<String>, FtpError> {
        let data = match self.transfer("NLST") {
            Ok(data) => data,
            Err(FtpError::Rejected(reply)) if reply.code == 450 || reply.code == 550 => {
                debug!("NLST rejected ({}), treating as empty listing", reply);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&data);
        Ok(text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .map(|line| line.rsplit('/').next().unwrap_or(line))
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .map(str::to_string)
            .collect())
    }

    /// Download `name` from the current directory into memory.
    pub fn retr(&mut self, name: &str) -> Result<Vec<u8>, FtpError> {
        self.transfer(&format!("RETR {}", name))
    }

    /// Send `QUIT` and consume the stream.
    pub fn quit(mut self) -> Result<(), FtpError> {
        self.closed = true;
        self.expect("QUIT", &[221, 200])?;
        Ok(())
    }

    // ── data connections ────────────────────────────────────────────

    fn transfer(&mut self, command: &str) -> Result<Vec<u8>, FtpError> {
        let addr = self.passive()?;
        let tcp = TcpStream::connect(addr)?;

        self.expect(command, &[125, 150])?;

        let mut data = if self.protected_data {
            let tls = self
                .tls
                .as_ref()
                .ok_or_else(|| FtpError::Malformed("protected data without TLS".to_string()))?;
            Channel::Tls(Box::new(tls.wrap(tcp)?))
        } else {
            Channel::Plain(tcp)
        };

        let bytes = data.read_all()?;
        data.shutdown();

        self.read_expected(&[226, 250])?;
        Ok(bytes)
    }

    fn passive(&mut self) -> Result<SocketAddr, FtpError> {
        let reply = self.expect("PASV", &[227])?;
        let port = parse_pasv_port(&reply.text)
            .ok_or_else(|| FtpError::Malformed(format!("cannot parse PASV reply: {}", reply)))?;
        let mut addr = self.control.get_ref().peer_addr()?;
        addr.set_port(port);
        Ok(addr)
    }

    // ── control connection ──────────────────────────────────────────

    fn read_greeting(&mut self) -> Result<(), FtpError> {
        let mut reply = self.read_reply()?;
        // 120: service ready in nnn minutes; the real greeting follows.
        while reply.code == 120 {
            reply = self.read_reply()?;
        }
        if reply.code != 220 {
            return Err(FtpError::Rejected(reply));
        }
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), FtpError> {
        if command.starts_with("PASS ") {
            debug!("ftp > PASS ****");
        } else {
            debug!("ftp > {}", command);
        }
        let channel = self.control.get_mut();
        channel.write_all(command.as_bytes())?;
        channel.write_all(b"\r\n")?;
        channel.flush()?;
        Ok(())
    }

    fn expect(&mut self, command: &str, codes: &[u16]) -> Result<Reply, FtpError> {
        self.send(command)?;
        self.read_expected(codes)
    }

    fn read_expected(&mut self, codes: &[u16]) -> Result<Reply, FtpError> {
        let reply = self.read_reply()?;
        if codes.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(FtpError::Rejected(reply))
        }
    }

    fn read_line(&mut self) -> Result<String, FtpError> {
        let mut raw = Vec::new();
        let n = self.control.read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Err(FtpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control connection closed by server",
            )));
        }
        Ok(String::from_utf8_lossy(&raw).trim_end().to_string())
    }

    fn read_reply(&mut self) -> Result<Reply, FtpError> {
        let first = self.read_line()?;
        let (code, multiline) = parse_status(&first)
            .ok_or_else(|| FtpError::Malformed(first.clone()))?;
        let mut text = first.get(4..).unwrap_or("").to_string();

        if multiline {
            let terminator = format!("{} ", code);
            loop {
                let line = self.read_line()?;
                text.push('\n');
                if line.starts_with(&terminator) || line == code.to_string() {
                    text.push_str(line.get(4..).unwrap_or(""));
                    break;
                }
                text.push_str(&line);
            }
        }

        debug!("ftp < {} {}", code, text);
        Ok(Reply { code, text })
    }
}

impl Drop for FtpStream {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.send("QUIT");
        }
    }
}

/// Parse the status line prefix: `"220 text"`, `"220-text"`, or `"220"`.
fn parse_status(line: &str) -> Option<(u16, bool)> {
    let code_str = line.get(..3)?;
    if !code_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = code_str.parse().ok()?;
    match line.as_bytes().get(3) {
        None | Some(b' ') => Some((code, false)),
        Some(b'-') => Some((code, true)),
        Some(_) => None,
    }
}

/// Extract the port from `Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv_port(text: &str) -> Option<u16> {
    let start = text.find('(')?;
    let end = text[start..].find(')')? + start;
    let numbers: Vec<u16> = text[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u16>())
        .collect::<Result<_, _>>()
        .ok()?;
    if numbers.len() != 6 || numbers.iter().any(|&n| n > 255) {
        return None;
    }
    Some(numbers[4] * 256 + numbers[5])
}

/// Extract the quoted path of a `257` reply; `""` inside the quotes is an
/// escaped quote.
fn parse_pwd(text: &str) -> Option<String> {
    let start = text.find('"')? + 1;
    let mut path = String::new();
    let mut chars = text[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}
