//! # Report Chat
//!
//! Fetch CSV reports from an FTP/FTPS server and chat about them.
//!
//! Report Chat downloads every CSV report under a remote directory (optionally
//! walking `YYYYMM` month folders), concatenates them into one in-memory
//! table, and feeds a top-N digest of that table to a hosted chat-completion
//! model with every question.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  FTP / FTPS  │──▶│    Fetch    │──▶│ Report table │
//! │  transports  │   │ scan+parse  │   │   + digest   │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │
//!                                             ▼
//!                      ┌──────────┐     ┌───────────┐
//!                      │   CLI    │◀───▶│  Session  │──▶ chat API
//!                      │(repchat) │     │  history  │    (SSE)
//!                      └──────────┘     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export FTP_PASSWORD=...
//! repchat fetch                  # load once and print the digest
//! export OPENAI_API_KEY=...
//! repchat chat                   # /fetch, then ask questions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`ftp`] | Minimal FTP/FTPS client |
//! | [`transport`] | Transport modes, connector and session traits |
//! | [`fetch`] | Directory discovery, download, parse, concatenate |
//! | [`chat`] | Streaming chat-completion client |
//! | [`session`] | Table + conversation state of the chat loop |
//! | [`fetch_cmd`] | `repchat fetch` |
//! | [`chat_cmd`] | `repchat chat` |
//!
//! Table parsing, the digest, and the conversation history live in the
//! `report-chat-core` crate.

pub mod chat;
pub mod chat_cmd;
pub mod config;
pub mod fetch;
pub mod fetch_cmd;
pub mod ftp;
pub mod session;
pub mod transport;
