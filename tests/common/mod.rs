//! In-process plaintext FTP server for integration tests.
//!
//! Serves an ordered virtual tree on `127.0.0.1:<ephemeral>` and records every
//! command it receives. Supports the commands the client uses: `USER`,
//! `PASS`, `PWD`, `CWD`, `TYPE`, `PASV`, `NLST`, `RETR`, `QUIT`.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

pub const USER: &str = "reports";
pub const PASSWORD: &str = "s3cret";

/// Directories and files, listed in insertion order.
#[derive(Clone, Default)]
pub struct Tree {
    /// `(absolute path, None)` for directories, `Some(bytes)` for files.
    entries: Vec<(String, Option<Vec<u8>>)>,
    /// Files whose `RETR` is answered with `550`.
    refused: Vec<String>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push((path.to_string(), None));
        self
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.entries
            .push((path.to_string(), Some(content.as_bytes().to_vec())));
        self
    }

    pub fn refuse(mut self, path: &str) -> Self {
        self.refused.push(path.to_string());
        self
    }

    fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.entries.iter().any(|(p, c)| p == path && c.is_none())
    }

    fn file_content(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .and_then(|(_, c)| c.as_deref())
    }

    fn children(&self, dir: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(p, _)| parent(p) == dir)
            .map(|(p, _)| p.rsplit('/').next().unwrap_or(p).to_string())
            .collect()
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

fn resolve(cwd: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else if cwd == "/" {
        format!("/{}", path)
    } else {
        format!("{}/{}", cwd, path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

pub struct FakeFtpServer {
    pub port: u16,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeFtpServer {
    pub fn start(tree: Tree) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&commands);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let tree = tree.clone();
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    let _ = serve(stream, &tree, &log);
                });
            }
        });

        Self { port, commands }
    }

    /// Every command received so far, across connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Received commands starting with `verb`.
    pub fn commands_with(&self, verb: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(verb))
            .collect()
    }
}

fn serve(stream: TcpStream, tree: &Tree, log: &Mutex<Vec<String>>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let mut cwd = "/".to_string();
    let mut user_ok = false;
    let mut passive: Option<TcpListener> = None;

    reply(&mut out, "220 fake ftp ready")?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        log.lock().unwrap().push(line.clone());

        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match verb.as_str() {
            "USER" => {
                user_ok = arg == USER;
                reply(&mut out, "331 password required")?;
            }
            "PASS" => {
                if user_ok && arg == PASSWORD {
                    reply(&mut out, "230 logged in")?;
                } else {
                    reply(&mut out, "530 login incorrect")?;
                }
            }
            "PWD" => reply(&mut out, &format!("257 \"{}\" is the current directory", cwd))?,
            "CWD" => {
                let target = resolve(&cwd, &arg);
                if tree.is_dir(&target) {
                    cwd = target;
                    reply(&mut out, "250 directory changed")?;
                } else {
                    reply(&mut out, "550 no such directory")?;
                }
            }
            "TYPE" => reply(&mut out, "200 type set")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                reply(
                    &mut out,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port / 256,
                        port % 256
                    ),
                )?;
            }
            "NLST" => {
                let Some(listener) = passive.take() else {
                    reply(&mut out, "425 use PASV first")?;
                    continue;
                };
                let listing: String = tree
                    .children(&cwd)
                    .iter()
                    .map(|name| format!("{}\r\n", name))
                    .collect();
                send_data(&mut out, listener, listing.as_bytes())?;
            }
            "RETR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut out, "425 use PASV first")?;
                    continue;
                };
                let path = resolve(&cwd, &arg);
                match tree.file_content(&path) {
                    Some(content) if !tree.refused.contains(&path) => {
                        send_data(&mut out, listener, content)?;
                    }
                    _ => reply(&mut out, "550 file unavailable")?,
                }
            }
            "QUIT" => {
                reply(&mut out, "221 bye")?;
                return Ok(());
            }
            _ => reply(&mut out, "502 command not implemented")?,
        }
    }
}

fn send_data(control: &mut TcpStream, listener: TcpListener, data: &[u8]) -> std::io::Result<()> {
    let (mut conn, _) = listener.accept()?;
    reply(control, "150 opening data connection")?;
    conn.write_all(data)?;
    drop(conn);
    reply(control, "226 transfer complete")
}

fn reply(out: &mut TcpStream, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.write_all(b"\r\n")?;
    out.flush()
}
