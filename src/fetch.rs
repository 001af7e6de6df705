//! Report fetcher.
//!
//! Downloads every CSV report under the configured base path and
//! concatenates them into one [`ReportTable`].
//!
//! # Workflow
//!
//! 1. Open a session through a [`Connector`] (handshake + login).
//! 2. Enter the base path. Failing to do so is fatal.
//! 3. Optionally discover year-month subdirectories (`YYYYMM` names starting
//!    with the configured year prefix) by trying to enter each entry and
//!    going back to the base path whether or not that worked. Only entries
//!    that could be entered are scanned.
//! 4. Scan the base path, or each discovered subdirectory, one level deep:
//!    list it, download the files matching the include globs, parse each as
//!    CSV, and append its rows.
//! 5. Close the session, on the error path too.
//!
//! # Partial failures
//!
//! A file that cannot be downloaded (server rejection) or parsed is skipped,
//! logged, and recorded in [`FetchLog::skipped`]; the rest of the batch
//! continues. Losing the control connection aborts the fetch.
//!
//! No files at all is not an error: the result is an empty table.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use report_chat_core::table::ReportTable;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ftp::{FtpError, Reply};
use crate::transport::{ConnectionProfile, Connector, FtpConnector, RemoteSession};

/// Fatal fetch failures. Each variant maps to a distinct user diagnostic.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: FtpError,
    },
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: FtpError,
    },
    #[error("login rejected for user '{user}': {reply}")]
    Auth { user: String, reply: Reply },
    #[error("remote path '{path}' cannot be opened: {source}")]
    PathNotFound {
        path: String,
        #[source]
        source: FtpError,
    },
    #[error("transfer failed: {0}")]
    Transport(#[from] FtpError),
}

impl FetchError {
    /// Short category label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Config(_) => "configuration",
            FetchError::Connect { .. } => "connection",
            FetchError::Handshake { .. } => "tls handshake",
            FetchError::Auth { .. } => "authentication",
            FetchError::PathNotFound { .. } => "missing path",
            FetchError::Transport(_) => "transport",
        }
    }
}

/// What to scan once connected.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Scan `YYYYMM` subdirectories of the base path instead of the base path.
    pub recurse_year_month: bool,
    /// Leading digits a subdirectory name must start with (e.g. `"2025"`).
    pub year_prefix: String,
    include: GlobSet,
}

impl FetchOptions {
    /// Build options; `include_globs` are matched case-insensitively against
    /// bare file names.
    pub fn new(
        recurse_year_month: bool,
        year_prefix: impl Into<String>,
        include_globs: &[String],
    ) -> Result<Self, FetchError> {
        let year_prefix = year_prefix.into();
        if year_prefix.is_empty()
            || year_prefix.len() > 6
            || !year_prefix.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FetchError::Config(format!(
                "year prefix must be 1 to 6 digits, got '{}'",
                year_prefix
            )));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in include_globs {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| FetchError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let include = builder
            .build()
            .map_err(|e| FetchError::Config(format!("invalid include globs: {}", e)))?;

        Ok(Self {
            recurse_year_month,
            year_prefix,
            include,
        })
    }

    pub fn is_included(&self, name: &str) -> bool {
        self.include.is_match(name)
    }
}

/// A file left out of the table, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Everything a fetch did besides building the table.
#[derive(Debug, Clone, Default)]
pub struct FetchLog {
    /// Directories scanned for reports, in scan order.
    pub directories: Vec<String>,
    /// Files whose rows were appended, in load order.
    pub files: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub table: ReportTable,
    pub log: FetchLog,
}

/// Fetch over FTP/FTPS using the profile's transport mode.
pub fn fetch(profile: &ConnectionProfile, options: &FetchOptions) -> Result<FetchReport, FetchError> {
    fetch_with(&FtpConnector, profile, options)
}

/// Fetch through any [`Connector`].
///
/// The session is closed before returning, whether the scan succeeded or
/// not. A failure to close after a successful scan is logged and does not
/// discard the table.
pub fn fetch_with<C: Connector>(
    connector: &C,
    profile: &ConnectionProfile,
    options: &FetchOptions,
) -> Result<FetchReport, FetchError> {
    let mut session = connector.open(profile)?;
    let outcome = scan(&mut session, &profile.base_path, options);

    if let Err(e) = session.close() {
        warn!("closing the session with {} failed: {}", profile.host, e);
    }

    let report = outcome?;
    info!(
        "fetched {} rows from {} files ({} skipped)",
        report.table.len(),
        report.log.files.len(),
        report.log.skipped.len()
    );
    Ok(report)
}

fn scan<S: RemoteSession>(
    session: &mut S,
    base_path: &str,
    options: &FetchOptions,
) -> Result<FetchReport, FetchError> {
    match session.change_dir(base_path) {
        Ok(()) => {}
        Err(source) if source.is_rejection() => {
            return Err(FetchError::PathNotFound {
                path: base_path.to_string(),
                source,
            });
        }
        Err(other) => return Err(FetchError::Transport(other)),
    }
    let root = session.current_dir()?;

    let mut report = FetchReport::default();

    if !options.recurse_year_month {
        scan_directory(session, &root, options, &mut report)?;
        return Ok(report);
    }

    for name in discover_year_month_dirs(session, &root, &options.year_prefix)? {
        session.change_dir(&name)?;
        let scanned = scan_directory(session, &join_remote(&root, &name), options, &mut report);
        session.change_dir(&root)?;
        scanned?;
    }

    Ok(report)
}

/// Year-month subdirectories of `root` that could actually be entered, in
/// listing order. Leaves the session in `root`.
fn discover_year_month_dirs<S: RemoteSession>(
    session: &mut S,
    root: &str,
    year_prefix: &str,
) -> Result<Vec<String>, FetchError> {
    let mut dirs = Vec::new();
    for name in session.list()? {
        if !is_year_month_name(&name, year_prefix) {
            continue;
        }
        if try_enter_directory(session, root, &name)? {
            dirs.push(name);
        } else {
            debug!("'{}' matches the year-month pattern but is not a directory", name);
        }
    }
    Ok(dirs)
}

/// Try to enter `name`, then return to `root`.
///
/// `Ok(true)` means `name` is a directory. A rejected `CWD` only rules the
/// entry out; a lost connection fails the fetch.
fn try_enter_directory<S: RemoteSession>(
    session: &mut S,
    root: &str,
    name: &str,
) -> Result<bool, FetchError> {
    let entered = match session.change_dir(name) {
        Ok(()) => true,
        Err(e) if e.is_rejection() => false,
        Err(e) => return Err(FetchError::Transport(e)),
    };
    session.change_dir(root)?;
    Ok(entered)
}

/// Download and parse every included file of the current directory.
fn scan_directory<S: RemoteSession>(
    session: &mut S,
    label: &str,
    options: &FetchOptions,
    report: &mut FetchReport,
) -> Result<(), FetchError> {
    info!("scanning {}", label);
    report.log.directories.push(label.to_string());

    for name in session.list()? {
        if !options.is_included(&name) {
            continue;
        }
        let path = join_remote(label, &name);

        let bytes = match session.retrieve(&name) {
            Ok(bytes) => bytes,
            Err(e) if e.is_rejection() => {
                warn!("skipping {}: download refused: {}", path, e);
                report.log.skipped.push(SkippedFile {
                    path,
                    reason: format!("download refused: {}", e),
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match ReportTable::from_csv(&bytes) {
            Ok(table) => {
                debug!("loaded {} rows from {}", table.len(), path);
                report.table.append(table);
                report.log.files.push(path);
            }
            Err(e) => {
                warn!("skipping {}: {}", path, e);
                report.log.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// `true` for six-digit names such as `202501` that start with `year_prefix`.
pub fn is_year_month_name(name: &str, year_prefix: &str) -> bool {
    name.len() == 6 && name.bytes().all(|b| b.is_ascii_digit()) && name.starts_with(year_prefix)
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}
