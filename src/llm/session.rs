//! Conversation transcript ownership
//!
//! A `Session` is the ordered list of turns for one conversation. It is a
//! plain value owned by the caller; there is no process-wide conversation
//! state anywhere in the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn in the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// System preamble/instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    /// Convert to the wire string used in prompt framing
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a wire role string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A single turn in the conversation
///
/// Turns are immutable once created; the session mutates only by appending.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the turn
    pub role: Role,

    /// Raw content
    pub text: String,

    /// When the turn was created
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system turn
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

impl PartialEq for Turn {
    // Timestamps are bookkeeping, not identity
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.text == other.text
    }
}

/// An ordered conversation transcript
///
/// Insertion order defines chronology. Appends happen in
/// user-message-then-assistant-reply order; concurrent writers are not
/// supported and must be serialized by the caller.
#[derive(Clone, Debug, Default)]
pub struct Session {
    /// Turn history, chronological
    turns: Vec<Turn>,

    /// Seed system preamble, restored by `reset()`
    seed: Option<String>,
}

impl Session {
    /// Create an empty session with no system preamble
    pub fn empty() -> Self {
        Self {
            turns: Vec::new(),
            seed: None,
        }
    }

    /// Create a session seeded with a system preamble turn
    pub fn with_system(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        Self {
            turns: vec![Turn::system(preamble.clone())],
            seed: Some(preamble),
        }
    }

    /// Append a user turn
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    /// Append a system turn
    ///
    /// Later system turns are not merged with the seed; they appear at their
    /// insertion position like any other turn.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::system(text));
    }

    /// Append an already-built turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Reset to the initial seeded state
    pub fn reset(&mut self) {
        self.turns.clear();
        if let Some(seed) = &self.seed {
            self.turns.push(Turn::system(seed.clone()));
        }
    }

    /// All turns, chronological
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has no turns
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The seed system preamble, if any
    pub fn system_preamble(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    /// Last user turn, if any
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }

    /// Last assistant turn, if any
    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    /// Export the transcript to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.turns)
    }

    /// Replace the transcript with turns imported from JSON
    pub fn from_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        self.turns = serde_json::from_str(json)?;
        Ok(())
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.turns == other.turns
    }
}
