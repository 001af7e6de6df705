//! Conversation history sent to the completion API.
//!
//! The history is an ordered list of role/content messages that only grows
//! during a session. The single exception is [`ConversationHistory::rollback`],
//! used to withdraw a user turn whose completion request failed.

use serde::{Deserialize, Serialize};

/// Author of a chat message, serialized in the lowercase wire form
/// (`"system"`, `"user"`, `"assistant"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role/content entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Build the user turn for a question: the digest, a blank line, then the
/// question itself.
pub fn compose_user_turn(digest: &str, question: &str) -> String {
    format!("{}\n\nUser question: {}", digest.trim_end(), question)
}

/// Append-only message log for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history whose first message is a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Current length, to be handed back to [`rollback`](Self::rollback).
    pub fn checkpoint(&self) -> usize {
        self.messages.len()
    }

    /// Drop every message appended after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        self.messages.truncate(checkpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_compose_user_turn() {
        let turn = compose_user_turn("Top 5 cancion (by streams):\n- A: 13\n", "Which song leads?");
        assert_eq!(
            turn,
            "Top 5 cancion (by streams):\n- A: 13\n\nUser question: Which song leads?"
        );
    }

    #[test]
    fn test_history_grows_in_order() {
        let mut history = ConversationHistory::with_system_prompt("be brief");
        history.push(ChatMessage::user("q1"));
        history.push(ChatMessage::assistant("a1"));

        let roles: Vec<_> = history.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_rollback_to_checkpoint() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("q1"));
        history.push(ChatMessage::assistant("a1"));

        let mark = history.checkpoint();
        history.push(ChatMessage::user("q2"));
        history.rollback(mark);

        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[1], ChatMessage::assistant("a1"));
    }
}
