//! TOML configuration.
//!
//! ```toml
//! [ftp]
//! host = "ftp.example.com"
//! username = "reports"
//! # password = "..."            # falls back to $FTP_PASSWORD
//! base_path = "/trends"
//! mode = "explicit-tls"          # plain | explicit-tls | explicit-tls-auth-ssl | implicit-tls
//! tls_version = "1.2"            # any | 1.2 | 1.3
//! verify_certificate = true
//! recurse_year_month = true
//! year_prefix = "2025"           # default: current year
//!
//! [report]
//! key_column = "cancion"
//! measure_column = "streams"
//!
//! [chat]
//! model = "gpt-3.5-turbo"
//! ```
//!
//! Secrets are read from the environment: `FTP_PASSWORD` when
//! `ftp.password` is absent, and `OPENAI_API_KEY` for the chat.

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use report_chat_core::summary::{SummaryColumns, DEFAULT_TOP_N};
use serde::Deserialize;
use std::path::Path;

use crate::fetch::FetchOptions;
use crate::ftp::tls::TlsVersion;
use crate::transport::{ConnectionProfile, TransportMode};

/// Environment variable consulted when `ftp.password` is not set.
pub const FTP_PASSWORD_ENV: &str = "FTP_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ftp: FtpConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Deserialize, Clone)]
pub struct FtpConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default)]
    pub tls_version: TlsVersion,
    #[serde(default = "default_verify_certificate")]
    pub verify_certificate: bool,
    #[serde(default)]
    pub recurse_year_month: bool,
    #[serde(default)]
    pub year_prefix: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_base_path() -> String {
    "/".to_string()
}
fn default_verify_certificate() -> bool {
    true
}
fn default_include_globs() -> Vec<String> {
    vec!["*.csv".to_string()]
}

impl std::fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("base_path", &self.base_path)
            .field("mode", &self.mode)
            .field("tls_version", &self.tls_version)
            .field("verify_certificate", &self.verify_certificate)
            .field("recurse_year_month", &self.recurse_year_month)
            .field("year_prefix", &self.year_prefix)
            .field("include_globs", &self.include_globs)
            .finish()
    }
}

impl FtpConfig {
    /// Resolve the password (config, then `$FTP_PASSWORD`) into a profile.
    pub fn connection_profile(&self) -> Result<ConnectionProfile> {
        self.connection_profile_with(std::env::var(FTP_PASSWORD_ENV).ok())
    }

    /// Like [`connection_profile`](Self::connection_profile) with an explicit
    /// fallback password instead of reading the environment.
    pub fn connection_profile_with(&self, env_password: Option<String>) -> Result<ConnectionProfile> {
        let password = self
            .password
            .clone()
            .or(env_password)
            .filter(|p| !p.is_empty())
            .with_context(|| {
                format!(
                    "FTP password not configured: set ftp.password or {}",
                    FTP_PASSWORD_ENV
                )
            })?;

        Ok(ConnectionProfile {
            host: self.host.clone(),
            port: self.port.unwrap_or_else(|| self.mode.default_port()),
            username: self.username.clone(),
            password,
            base_path: self.base_path.clone(),
            mode: self.mode,
            tls_version: self.tls_version,
            verify_certificate: self.verify_certificate,
        })
    }

    /// Fetch options, with `recurse` overriding `recurse_year_month` when set.
    /// The year prefix defaults to the current local year.
    pub fn fetch_options(&self, recurse: Option<bool>) -> Result<FetchOptions> {
        let year_prefix = self
            .year_prefix
            .clone()
            .unwrap_or_else(|| chrono::Local::now().year().to_string());
        let options = FetchOptions::new(
            recurse.unwrap_or(self.recurse_year_month),
            year_prefix,
            &self.include_globs,
        )?;
        Ok(options)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_measure_column")]
    pub measure_column: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            key_column: default_key_column(),
            measure_column: default_measure_column(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

fn default_key_column() -> String {
    "cancion".to_string()
}
fn default_measure_column() -> String {
    "streams".to_string()
}
fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

impl ReportConfig {
    pub fn summary_columns(&self) -> SummaryColumns {
        SummaryColumns {
            key: self.key_column.clone(),
            measure: self.measure_column.clone(),
            top_n: self.top_n,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            system_prompt: None,
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate ftp
    if config.ftp.host.trim().is_empty() {
        bail!("ftp.host must not be empty");
    }
    if config.ftp.username.trim().is_empty() {
        bail!("ftp.username must not be empty");
    }
    if config.ftp.port == Some(0) {
        bail!("ftp.port must be > 0");
    }
    if let Some(prefix) = &config.ftp.year_prefix {
        if prefix.is_empty() || prefix.len() > 6 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            bail!("ftp.year_prefix must be 1 to 6 digits, got '{}'", prefix);
        }
    }
    if config.ftp.include_globs.is_empty() {
        bail!("ftp.include_globs must list at least one pattern");
    }

    // Validate report
    if config.report.top_n == 0 {
        bail!("report.top_n must be >= 1");
    }
    if config.report.key_column.is_empty() || config.report.measure_column.is_empty() {
        bail!("report.key_column and report.measure_column must not be empty");
    }

    // Validate chat
    if config.chat.model.trim().is_empty() {
        bail!("chat.model must not be empty");
    }

    Ok(config)
}
