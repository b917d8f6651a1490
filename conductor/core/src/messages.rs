//! Conversation Messages
//!
//! The data carried between the coordinator and whoever renders the chat:
//! role-tagged [`Message`]s that make up a conversation, the identifier of a
//! generation attempt, and the [`ChatEvent`]s the coordinator pushes to its
//! single registered consumer.
//!
//! # Design Philosophy
//!
//! The consumer is a pure renderer. It never talks to the backend and never
//! mutates conversation state; it only observes fragments, completions,
//! failures and cancellations in the order the coordinator emits them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// Human input
    User,
    /// Model output
    Assistant,
}

impl Role {
    /// Lowercase wire name (`"system"`, `"user"`, `"assistant"`)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the conversation log
///
/// Messages are immutable once created; the log only grows by appending and
/// shrinks by trimming from the front.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Create a message with the given role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Who wrote this message
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Message text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content length in characters (the unit of the context budget)
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Identifier of one generation attempt
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events from the coordinator to its consumer
///
/// For any started session the consumer sees zero or more `Fragment`s
/// followed by exactly one of `Completed`, `Failed` or `Cancelled`, and
/// nothing for that session afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A decoded piece of the assistant's response
    Fragment {
        /// Session that produced the fragment
        session_id: SessionId,
        /// The fragment text (may be empty)
        text: String,
    },

    /// The response finished and was appended to the conversation
    Completed {
        /// Session that completed
        session_id: SessionId,
        /// The full assembled response
        full_text: String,
    },

    /// The backend failed; nothing was appended to the conversation
    Failed {
        /// Session that failed
        session_id: SessionId,
        /// Diagnostic description
        error: String,
    },

    /// The session was stopped before it finished
    Cancelled {
        /// Session that was cancelled
        session_id: SessionId,
    },
}

impl ChatEvent {
    /// Session this event belongs to
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Fragment { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::Cancelled { session_id } => session_id,
        }
    }

    /// Whether this is the last event a session will ever produce
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment { .. })
    }
}
