//! Model Server Clients
//!
//! The core only needs two things from a model server: a lazy sequence of
//! response chunks for a prompt, and the list of models it serves. Both sit
//! behind [`BackendClient`] so sessions can run against fakes in tests.
//!
//! # Implementations
//!
//! - [`OllamaBackend`]: HTTP client for a local Ollama server
//!
//! # Usage
//!
//! ```ignore
//! use chat_conductor::backend::{BackendClient, BackendConfig, OllamaBackend};
//!
//! let backend = OllamaBackend::new(BackendConfig::default())?;
//! let mut chunks = backend.generate("llama2", "User: hi\nAssistant: ").await?;
//! ```

mod ollama;
mod traits;

pub use ollama::OllamaBackend;
pub use traits::{BackendClient, BackendConfig, Chunk, ChunkStream};
