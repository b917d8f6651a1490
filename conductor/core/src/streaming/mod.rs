//! Streaming Infrastructure
//!
//! Runs one generation attempt at a time on a background task and hands its
//! output back to the owning thread in order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── owner thread ────────────────────────────┐
//! │  ConversationState ──snapshot──► StreamingSession ◄── next_event()   │
//! │         ▲                              │   ▲                         │
//! │         └──── append on Completed ─────┘   │ WorkerEvent (mpsc)      │
//! └────────────────────────────────────────────┼─────────────────────────┘
//!                                              │
//! ┌──────────────────────────── worker task ───┼─────────────────────────┐
//! │  BackendClient::generate() ─► Chunk ─► ChunkDecoder ─► fragment      │
//! │           ▲                                                          │
//! │           └── CancellationToken checked before every await           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_conductor::{ConversationState, StreamingSession};
//!
//! let mut conversation = ConversationState::new(4096);
//! conversation.append_user("hi");
//!
//! let mut session = StreamingSession::new("llama2");
//! session.start(&conversation, Arc::new(backend))?;
//! while let Some(event) = session.next_event(&mut conversation).await {
//!     println!("{event:?}");
//! }
//! ```

mod decoder;
mod session;

pub use decoder::{ChunkDecoder, DEFAULT_TEXT_FIELD};
pub use session::{SessionEvent, SessionStatus, StreamingSession, DEFAULT_EVENT_BUFFER};

// Re-export Chunk from backend for convenience
pub use crate::backend::Chunk;
