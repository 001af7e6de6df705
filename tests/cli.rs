//! Runs the `repchat` binary end to end.

mod common;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use common::{FakeFtpServer, Tree, PASSWORD, USER};
use tempfile::TempDir;

fn repchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_repchat"))
}

fn write_config(port: u16, base_path: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("repchat.toml");
    fs::write(
        &config_path,
        format!(
            r#"[ftp]
host = "127.0.0.1"
port = {}
username = "{}"
base_path = "{}"
mode = "plain"
year_prefix = "2025"

[chat]
api_base = "http://127.0.0.1:9/v1"
"#,
            port, USER, base_path
        ),
    )
    .unwrap();
    (tmp, config_path)
}

fn repchat(config_path: &Path, args: &[&str]) -> Command {
    let mut command = Command::new(repchat_binary());
    command
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("OPENAI_API_KEY")
        .env("FTP_PASSWORD", PASSWORD);
    command
}

fn run(mut command: Command) -> (String, String, bool) {
    let output = command
        .output()
        .unwrap_or_else(|e| panic!("Failed to run repchat: {}", e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn reports() -> Tree {
    Tree::new()
        .dir("/trends")
        .file("/trends/a.csv", "cancion,streams\nA,10\nB,5\n")
        .file("/trends/b.csv", "cancion,streams\nA,3\n")
}

#[test]
fn test_fetch_prints_log_and_digest() {
    let server = FakeFtpServer::start(reports());
    let (_tmp, config_path) = write_config(server.port, "/trends");

    let (stdout, stderr, success) = run(repchat(&config_path, &["fetch"]));
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("loaded: /trends/a.csv"));
    assert!(stdout.contains("loaded: /trends/b.csv"));
    assert!(stdout.contains("rows: 3"));
    assert!(stdout.contains("- A: 13\n- B: 5"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_fetch_empty_directory_warns() {
    let server = FakeFtpServer::start(Tree::new().dir("/empty"));
    let (_tmp, config_path) = write_config(server.port, "/empty");

    let (stdout, stderr, success) = run(repchat(&config_path, &["fetch"]));
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("no CSV files found"));
}

#[test]
fn test_fetch_header_only_files_warn() {
    let server = FakeFtpServer::start(
        Tree::new()
            .dir("/trends")
            .file("/trends/a.csv", "cancion,streams\n")
            .file("/trends/b.csv", "cancion,streams\n"),
    );
    let (_tmp, config_path) = write_config(server.port, "/trends");

    let (stdout, stderr, success) = run(repchat(&config_path, &["fetch"]));
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("loaded: /trends/a.csv"));
    assert!(stdout.contains("warning: 2 CSV files loaded but none has data rows"));
    assert!(!stdout.contains("rows: 0"));
}

#[test]
fn test_fetch_wrong_password_fails() {
    let server = FakeFtpServer::start(reports());
    let (_tmp, config_path) = write_config(server.port, "/trends");

    let mut command = repchat(&config_path, &["fetch"]);
    command.env("FTP_PASSWORD", "wrong");
    let (_stdout, stderr, success) = run(command);
    assert!(!success);
    assert!(stderr.contains("authentication"), "stderr={}", stderr);
}

#[test]
fn test_fetch_without_password_is_config_error() {
    let (_tmp, config_path) = write_config(21, "/trends");

    let mut command = repchat(&config_path, &["fetch"]);
    command.env_remove("FTP_PASSWORD");
    let (_stdout, stderr, success) = run(command);
    assert!(!success);
    assert!(stderr.contains("FTP_PASSWORD"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_stdout, stderr, success) = run(repchat(&tmp.path().join("nope.toml"), &["fetch"]));
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_chat_requires_api_key() {
    let tmp = TempDir::new().unwrap();
    // Reported even though the config file does not exist.
    let (_stdout, stderr, success) = run(repchat(&tmp.path().join("nope.toml"), &["chat"]));
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr={}", stderr);
}

#[test]
fn test_chat_fetch_then_quit() {
    let server = FakeFtpServer::start(reports());
    let (_tmp, config_path) = write_config(server.port, "/trends");

    let mut command = repchat(&config_path, &["chat"]);
    command
        .env("OPENAI_API_KEY", "sk-test")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"\n/fetch\n/quit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("/fetch loads reports"));
    assert!(stdout.contains("rows: 3"));
    assert!(server.commands_with("RETR").len() == 2);
}
