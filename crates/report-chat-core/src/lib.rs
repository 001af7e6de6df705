//! # Report Chat Core
//!
//! Shared, I/O-free logic for Report Chat: the in-memory report table,
//! the top-N digest that is injected ahead of every chat question, and the
//! conversation history sent to the completion API.
//!
//! This crate contains no sockets, TLS, tokio, or filesystem access. The
//! transport and the chat client live in the `report-chat` app crate.

pub mod history;
pub mod summary;
pub mod table;
