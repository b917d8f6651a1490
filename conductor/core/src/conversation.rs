//! Conversation State
//!
//! The ordered, role-tagged message log for one conversation and the single
//! source of truth for what gets sent to the backend.
//!
//! # Design Philosophy
//!
//! The log is owned by the coordinator. It only changes by appending to the
//! back or trimming from the front; existing entries are never replaced.
//! Generation attempts work on a copy (see [`ConversationState::snapshot`])
//! so later edits never leak into an in-flight prompt.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::context::ContextTrimmer;
use crate::messages::{Message, Role};

/// Message counts and size estimates for a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAnalytics {
    /// All messages currently in the log
    pub total_messages: usize,
    /// Messages authored by the user
    pub user_messages: usize,
    /// Messages authored by the assistant
    pub assistant_messages: usize,
    /// Whitespace-separated word count across all messages
    pub estimated_tokens: usize,
    /// Configured context budget in characters
    pub context_budget: usize,
}

/// The message log plus its context budget
#[derive(Clone, Debug)]
pub struct ConversationState {
    messages: VecDeque<Message>,
    context_budget: usize,
}

impl ConversationState {
    /// Create an empty conversation with the given budget (characters)
    #[must_use]
    pub fn new(context_budget: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            context_budget,
        }
    }

    /// Append a message to the end of the log
    pub fn append(&mut self, message: Message) {
        tracing::debug!(
            role = %message.role(),
            chars = message.char_len(),
            position = self.messages.len(),
            "Appended message"
        );
        self.messages.push_back(message);
    }

    /// Append a user message
    pub fn append_user(&mut self, content: impl Into<String>) {
        self.append(Message::user(content));
    }

    /// Append an assistant message
    pub fn append_assistant(&mut self, content: impl Into<String>) {
        self.append(Message::assistant(content));
    }

    /// Trim the log to the configured budget
    ///
    /// Returns the number of messages removed.
    pub fn trim(&mut self) -> usize {
        ContextTrimmer::new(self.context_budget).trim(&mut self.messages)
    }

    /// Set a new budget and trim to it
    pub fn trim_to(&mut self, budget: usize) -> usize {
        self.context_budget = budget;
        self.trim()
    }

    /// Configured budget in characters
    #[must_use]
    pub fn context_budget(&self) -> usize {
        self.context_budget
    }

    /// Change the budget without trimming
    pub fn set_context_budget(&mut self, budget: usize) {
        self.context_budget = budget;
    }

    /// Copy of the current messages, in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Iterate over the messages in order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of messages in the log
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total content length in characters
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    /// Content of the most recent user message
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .map(Message::content)
    }

    /// Drop every message (keeps the budget)
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Counts and estimates over the current log
    #[must_use]
    pub fn analytics(&self) -> ConversationAnalytics {
        let count = |role: Role| self.messages.iter().filter(|m| m.role() == role).count();

        ConversationAnalytics {
            total_messages: self.messages.len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
            estimated_tokens: self
                .messages
                .iter()
                .map(|m| m.content().split_whitespace().count())
                .sum(),
            context_budget: self.context_budget,
        }
    }

    /// Render the log as markdown: `**role**: content`, blank-line separated
    #[must_use]
    pub fn to_markdown(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("**{}**: {}", m.role(), m.content()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
