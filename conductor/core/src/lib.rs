//! Chat Conductor - Streaming Inference Session Manager
//!
//! This crate owns the moving parts of a conversational client for a
//! streaming language-model backend, independent of any UI: the message log,
//! its context budget, prompt rendering, chunk decoding, and the
//! single-active-session state machine that streams a response in order and
//! can be cancelled at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Consumer (UI, REPL)                       │
//! │        append / send / cancel ▼          ▲ ChatEvent (ordered)   │
//! └───────────────────────────────┼──────────┼───────────────────────┘
//!                                 │          │
//! ┌───────────────────────────────┼──────────┼───────────────────────┐
//! │                           Conductor                              │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ConversationState │─►│ContextTrimmer│  │  StreamingSession  │  │
//! │  │  (message log)   │  └──────────────┘  │  (state machine)   │  │
//! │  └────────┬─────────┘                    └─────────┬──────────┘  │
//! │           └──── snapshot ─► PromptSerializer ──────┘             │
//! └────────────────────────────────────────────────────┼─────────────┘
//!                                                      │ worker task
//!                             BackendClient ─► Chunk ─► ChunkDecoder
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: Coordinator exposing the inbound operations
//! - [`ChatEvent`]: Events sent from the Conductor to its consumer
//! - [`ConversationState`]: Ordered, role-tagged message log
//! - [`StreamingSession`]: One generation attempt
//! - [`BackendClient`]: Capability the core needs from a model server
//!
//! # Quick Start
//!
//! ```ignore
//! use chat_conductor::{Conductor, ConductorConfig, OllamaBackend};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConductorConfig::from_env()?;
//!     let backend = OllamaBackend::new(config.backend.clone())?;
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let mut conductor = Conductor::new(backend, config, tx);
//!
//!     conductor.send_message("Hello!").await?;
//!     while conductor.next_event().await.is_some() {
//!         while let Ok(event) = rx.try_recv() {
//!             // Render event
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Backend abstraction and the Ollama client
//! - [`config`]: Layered configuration (defaults, TOML, environment)
//! - [`context`]: Character-budget trimming
//! - [`conversation`]: The message log
//! - [`conductor`]: Main Conductor struct
//! - [`error`]: Error types
//! - [`messages`]: Messages, roles and outbound events
//! - [`prompt`]: Prompt rendering
//! - [`streaming`]: Chunk decoding and the session state machine

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod messages;
pub mod prompt;
pub mod streaming;

// Re-exports for convenience
pub use backend::{BackendClient, BackendConfig, Chunk, ChunkStream, OllamaBackend};
pub use conductor::Conductor;
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConfigError,
};
pub use context::ContextTrimmer;
pub use conversation::{ConversationAnalytics, ConversationState};
pub use error::{ConductorError, SessionError};
pub use messages::{ChatEvent, Message, Role, SessionId};
pub use prompt::{PromptSerializer, ASSISTANT_CUE};
pub use streaming::{ChunkDecoder, SessionEvent, SessionStatus, StreamingSession};
