//! Interactive session state.
//!
//! A [`ChatSession`] holds the current report table and the conversation
//! history. Each user action takes the session explicitly:
//!
//! - [`ChatSession::refresh`] swaps in a freshly fetched table. A failed fetch
//!   leaves the previous table in place.
//! - [`ChatSession::ask`] prepends the digest of the current table to the
//!   question, streams the model's reply, and records both turns. A failed
//!   completion withdraws the question so the history never ends in an
//!   unanswered user turn.

use anyhow::Result;
use report_chat_core::history::{compose_user_turn, ChatMessage, ConversationHistory};
use report_chat_core::summary::{summarize, SummaryColumns, EMPTY_TABLE_DIGEST};
use report_chat_core::table::ReportTable;
use tracing::{info, warn};

use crate::chat::{collect_reply, ChatBackend};
use crate::fetch::{FetchError, FetchLog, FetchReport};

pub struct ChatSession {
    table: Option<ReportTable>,
    history: ConversationHistory,
    columns: SummaryColumns,
}

impl ChatSession {
    pub fn new(columns: SummaryColumns, system_prompt: Option<&str>) -> Self {
        let history = match system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => {
                ConversationHistory::with_system_prompt(prompt)
            }
            _ => ConversationHistory::new(),
        };
        Self {
            table: None,
            history,
            columns,
        }
    }

    /// The table of the last successful fetch, if any.
    pub fn table(&self) -> Option<&ReportTable> {
        self.table.as_ref()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run `fetch` and, on success, replace the current table with its result.
    pub fn refresh<F>(&mut self, fetch: F) -> Result<FetchLog, FetchError>
    where
        F: FnOnce() -> Result<FetchReport, FetchError>,
    {
        match fetch() {
            Ok(report) => {
                info!("session table replaced ({} rows)", report.table.len());
                self.table = Some(report.table);
                Ok(report.log)
            }
            Err(e) => {
                warn!("fetch failed, keeping the previous table: {}", e);
                Err(e)
            }
        }
    }

    /// Digest of the current table.
    pub fn digest(&self) -> String {
        match &self.table {
            Some(table) => summarize(table, &self.columns),
            None => EMPTY_TABLE_DIGEST.to_string(),
        }
    }

    /// Ask `question` about the current data and return the full reply.
    ///
    /// Fragments are handed to `on_fragment` as they arrive.
    pub async fn ask<B, F>(&mut self, question: &str, backend: &B, on_fragment: F) -> Result<String>
    where
        B: ChatBackend + ?Sized,
        F: FnMut(&str),
    {
        let checkpoint = self.history.checkpoint();
        self.history
            .push(ChatMessage::user(compose_user_turn(&self.digest(), question)));

        let reply = match backend.stream_reply(self.history.messages()).await {
            Ok(mut stream) => collect_reply(stream.as_mut(), on_fragment).await,
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) => {
                self.history.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.rollback(checkpoint);
                Err(e)
            }
        }
    }
}
