//! Streaming chat-completion client.
//!
//! [`ChatBackend`] is the seam between the session and the hosted model.
//! [`OpenAiChat`] implements it against any OpenAI-compatible
//! `POST {api_base}/chat/completions` endpoint with `"stream": true`.
//!
//! # Streaming
//!
//! The response body is a server-sent-events stream:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Event framing is left to `eventsource-stream`; [`CompletionStream`] only
//! interprets each event's JSON payload and yields the `delta.content`
//! pieces lazily as body chunks arrive. The stream is finite and cannot be
//! restarted; the caller prints fragments as they come and concatenates them
//! into the assistant message.
//!
//! No retries are attempted: a failed request is reported to the caller.

use std::fmt::Display;
use std::pin::Pin;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::{Stream, StreamExt};
use report_chat_core::history::ChatMessage;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::ChatConfig;

/// Environment variable holding the completion API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// A lazy, finite sequence of text fragments.
#[async_trait]
pub trait FragmentStream: Send {
    /// The next fragment, or `None` once the reply is complete.
    async fn next_fragment(&mut self) -> Result<Option<String>>;
}

/// Sends a conversation and streams back the reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_reply(&self, messages: &[ChatMessage]) -> Result<Box<dyn FragmentStream>>;
}

/// Drain `stream`, handing each fragment to `on_fragment`, and return the
/// concatenated reply.
pub async fn collect_reply<F>(stream: &mut dyn FragmentStream, mut on_fragment: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut reply = String::new();
    while let Some(fragment) = stream.next_fragment().await? {
        on_fragment(&fragment);
        reply.push_str(&fragment);
    }
    Ok(reply)
}

// ============ OpenAI-compatible backend ============

/// Chat backend for OpenAI-compatible completion APIs.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("{} is empty", API_KEY_ENV);
        }
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
        })
    }

    /// Read the key from `OPENAI_API_KEY`.
    pub fn from_env(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{} environment variable not set", API_KEY_ENV))?;
        Self::new(config, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn stream_reply(&self, messages: &[ChatMessage]) -> Result<Box<dyn FragmentStream>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        debug!("POST {} ({} messages)", self.endpoint, messages.len());
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Chat API request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!(
                "Chat API error {}: {}",
                status,
                body_text.chars().take(500).collect::<String>()
            );
        }

        Ok(Box::new(CompletionStream::new(response.bytes_stream())))
    }
}

/// Fragments of one streamed completion.
///
/// Built over any byte stream; [`OpenAiChat`] feeds it the HTTP body.
pub struct CompletionStream {
    events: Pin<Box<dyn Stream<Item = Result<Event, String>> + Send>>,
    done: bool,
}

impl CompletionStream {
    pub fn new<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + 'static,
        E: Display + 'static,
    {
        let events = body
            .eventsource()
            .map(|event| event.map_err(|e| e.to_string()));
        Self {
            events: Box::pin(events),
            done: false,
        }
    }
}

#[async_trait]
impl FragmentStream for CompletionStream {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        while !self.done {
            let Some(event) = self.events.next().await else {
                self.done = true;
                break;
            };
            let event = event.map_err(|e| anyhow!("Chat API stream interrupted: {}", e))?;
            trace!("chat SSE event: {}", event.data);

            match decode_payload(&event.data)? {
                Delta::Fragment(text) => return Ok(Some(text)),
                Delta::Done => self.done = true,
                Delta::Empty => {}
            }
        }
        Ok(None)
    }
}

/// What one event payload contributes to the reply.
#[derive(Debug, PartialEq, Eq)]
enum Delta {
    Fragment(String),
    Done,
    Empty,
}

fn decode_payload(data: &str) -> Result<Delta> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(Delta::Empty);
    }
    if data == "[DONE]" {
        return Ok(Delta::Done);
    }

    let json: Value = serde_json::from_str(data).map_err(|e| {
        debug!("failed to parse chat SSE JSON: {}", data);
        anyhow!("failed to parse chat SSE JSON: {}", e)
    })?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        bail!("Chat API stream error: {}", message);
    }

    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .filter(|text| !text.is_empty());

    Ok(match content {
        Some(text) => Delta::Fragment(text.to_string()),
        None => Delta::Empty,
    })
}
