//! # Report Chat CLI (`repchat`)
//!
//! ## Usage
//!
//! ```bash
//! repchat --config ./config/repchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repchat fetch` | Download the reports once and print the digest |
//! | `repchat chat` | Interactive chat about the reports |
//!
//! ## Examples
//!
//! ```bash
//! # Fetch the month folders of the current year
//! repchat fetch --recurse
//!
//! # Chat; type /fetch to load the reports, /quit to leave
//! OPENAI_API_KEY=sk-... repchat chat
//!
//! # See the FTP conversation
//! RUST_LOG=report_chat=debug repchat fetch
//! ```

use clap::{Parser, Subcommand};
use report_chat::{chat_cmd, config, fetch_cmd};
use std::path::PathBuf;

/// Report Chat: fetch CSV reports over FTP/FTPS and chat about them.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "repchat",
    about = "Report Chat: fetch CSV reports over FTP/FTPS and chat about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the reports once and print the scan log and digest.
    Fetch {
        /// Scan the YYYYMM subdirectories of the base path.
        #[arg(long, conflicts_with = "no_recurse")]
        recurse: bool,

        /// Scan only the base path, ignoring `recurse_year_month`.
        #[arg(long)]
        no_recurse: bool,
    },

    /// Chat about the reports. Requires OPENAI_API_KEY.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // A missing API key is reported before any config error.
    if let Commands::Chat = cli.command {
        chat_cmd::require_api_key()?;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch {
            recurse,
            no_recurse,
        } => {
            let recurse = match (recurse, no_recurse) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            fetch_cmd::run_fetch(&cfg, recurse)?;
        }
        Commands::Chat => {
            chat_cmd::run_chat(&cfg).await?;
        }
    }

    Ok(())
}
