//! `repchat chat`: the interactive loop.
//!
//! Reads one line at a time from stdin:
//!
//! | Input | Action |
//! |-------|--------|
//! | `/fetch` | fetch the reports and replace the session table |
//! | `/quit` | exit (end of input works too) |
//! | anything else | ask the model, streaming its reply to stdout |
//!
//! A failed fetch or completion is reported and the loop continues with the
//! session as it was.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{OpenAiChat, API_KEY_ENV};
use crate::config::Config;
use crate::fetch;
use crate::fetch_cmd::{describe_fetch_error, print_fetch_log};
use crate::session::ChatSession;

enum Input<'a> {
    Fetch,
    Quit,
    Question(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/fetch" => Input::Fetch,
        "/quit" | "/exit" => Input::Quit,
        question => Input::Question(question),
    }
}

/// Fail unless `OPENAI_API_KEY` holds a non-empty value.
pub fn require_api_key() -> Result<()> {
    if std::env::var(API_KEY_ENV).map_or(true, |key| key.trim().is_empty()) {
        anyhow::bail!(
            "{} is not set; export it before starting the chat",
            API_KEY_ENV
        );
    }
    Ok(())
}

pub async fn run_chat(config: &Config) -> Result<()> {
    require_api_key()?;
    let backend = OpenAiChat::from_env(&config.chat)?;

    // Resolve everything a fetch needs now, so configuration mistakes stop
    // the program instead of surfacing on the first /fetch.
    let profile = config.ftp.connection_profile()?;
    let options = config.ftp.fetch_options(None)?;

    let mut session = ChatSession::new(
        config.report.summary_columns(),
        config.chat.system_prompt.as_deref(),
    );

    println!(
        "repchat ({}) - /fetch loads reports from {}, /quit exits",
        backend.model(),
        profile.address()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("Failed to write to stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Fetch => match session.refresh(|| fetch::fetch(&profile, &options)) {
                Ok(log) => {
                    if let Some(table) = session.table() {
                        print_fetch_log(&log, table);
                    }
                }
                Err(e) => {
                    eprintln!(
                        "warning: {:#} (keeping the previous data)",
                        describe_fetch_error(e)
                    );
                }
            },
            Input::Question(question) => {
                let answer = session
                    .ask(question, &backend, |fragment| {
                        print!("{}", fragment);
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                if let Err(e) = answer {
                    eprintln!("error: {:#}", e);
                }
            }
        }
    }

    Ok(())
}
