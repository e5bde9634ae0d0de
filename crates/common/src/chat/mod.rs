//! Conversation state for a question-answering session
//!
//! Provides:
//! - User/assistant turn types
//! - An append-only conversation log with a bounded recency window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation turn, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only log of turns for one active session.
///
/// Owned by the caller and mutated only through push/clear; a turn is never
/// edited or removed once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// When the last turn was appended
    pub last_active_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: Vec::new(),
            started_at: now,
            last_active_at: now,
        }
    }

    /// Append a user turn
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Turn::user(text));
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Turn::assistant(text));
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.last_active_at = Utc::now();
    }

    /// All turns in conversational order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns in conversational order (all turns if fewer)
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Reset to a fresh session
    pub fn clear(&mut self) {
        self.turns.clear();
        let now = Utc::now();
        self.started_at = now;
        self.last_active_at = now;
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_order() {
        let mut conversation = Conversation::new();
        conversation.push_user("What is tau?");
        conversation.push_assistant("Tau is a microtubule-associated protein.");

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[1].role, Role::Assistant);
    }

    #[test]
    fn test_recent_window() {
        let mut conversation = Conversation::new();
        for i in 0..10 {
            conversation.push_user(format!("question {}", i));
        }

        let window = conversation.recent(5);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].text, "question 5");
        assert_eq!(window[4].text, "question 9");
    }

    #[test]
    fn test_recent_window_larger_than_history() {
        let mut conversation = Conversation::new();
        conversation.push_user("only question");

        let window = conversation.recent(5);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_clear_resets_turns() {
        let mut conversation = Conversation::new();
        conversation.push_user("first");
        conversation.clear();

        assert!(conversation.is_empty());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Turn::assistant("hello")).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }
}
