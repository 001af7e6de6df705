//! `repchat fetch`: one fetch, printed.

use anyhow::{anyhow, Result};
use report_chat_core::summary::summarize;
use report_chat_core::table::ReportTable;

use crate::config::Config;
use crate::fetch::{self, FetchError, FetchLog};

/// Fetch once and print what was scanned, loaded, and skipped, followed by
/// the digest.
pub fn run_fetch(config: &Config, recurse: Option<bool>) -> Result<()> {
    let profile = config.ftp.connection_profile()?;
    let options = config.ftp.fetch_options(recurse)?;

    let report = fetch::fetch(&profile, &options).map_err(describe_fetch_error)?;

    println!("fetch {}{}", profile.address(), profile.base_path);
    print_fetch_log(&report.log, &report.table);
    println!();
    print!("{}", summarize(&report.table, &config.report.summary_columns()));
    println!("ok");
    Ok(())
}

/// Print the scan log and row count, or a warning when there is nothing to
/// summarize.
pub fn print_fetch_log(log: &FetchLog, table: &ReportTable) {
    print!("{}", render_fetch_log(log, table));
}

fn render_fetch_log(log: &FetchLog, table: &ReportTable) -> String {
    let mut out = String::new();
    for dir in &log.directories {
        out.push_str(&format!("  scanned: {}\n", dir));
    }
    for file in &log.files {
        out.push_str(&format!("  loaded: {}\n", file));
    }
    for skipped in &log.skipped {
        out.push_str(&format!("  skipped: {} ({})\n", skipped.path, skipped.reason));
    }

    if log.files.is_empty() {
        out.push_str("  warning: no CSV files found\n");
    } else if table.is_empty() {
        out.push_str(&format!(
            "  warning: {} CSV files loaded but none has data rows\n",
            log.files.len()
        ));
    } else {
        out.push_str(&format!(
            "  rows: {} ({} columns)\n",
            table.len(),
            table.columns().len()
        ));
    }
    out
}

/// Turn a fetch failure into a user-facing error prefixed with its category.
pub fn describe_fetch_error(err: FetchError) -> anyhow::Error {
    let kind = err.kind();
    anyhow!(err).context(format!("fetch failed ({})", kind))
}
