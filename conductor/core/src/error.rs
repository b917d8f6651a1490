//! Error Types
//!
//! Typed errors for the inbound side of the core. Backend failures during
//! streaming are not errors here: they become `Failed` events.

use thiserror::Error;

use crate::streaming::SessionStatus;

/// Errors from driving a single [`crate::streaming::StreamingSession`]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// `start()` was called on a session that already left `Idle`
    #[error("session already started (status: {status:?})")]
    AlreadyStarted {
        /// Status at the time of the call
        status: SessionStatus,
    },
}

/// Errors from the coordinator's inbound operations
#[derive(Debug, Error)]
pub enum ConductorError {
    /// Empty or whitespace-only user input
    #[error("message is empty")]
    EmptyMessage,

    /// A context budget of zero
    #[error("context budget must be greater than zero")]
    InvalidBudget,

    /// Analysis requested with no selection and no prior user message
    #[error("nothing to analyze: select text or send a message first")]
    NothingToAnalyze,

    /// Session lifecycle misuse
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Backend call outside the streaming path (e.g., listing models)
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
