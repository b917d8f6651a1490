//! Backend Traits
//!
//! Trait definitions for language-model backends. The session layer only
//! needs two capabilities: start a generation and get back a lazy sequence
//! of chunks, and list the models the backend can serve. Anything that can
//! do both (an HTTP server, a scripted fake in tests) plugs in here.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One unit of backend output, in whichever encoding the backend used
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    /// Plain text with no envelope (non-streaming calls)
    Text(String),
    /// A serialized event object carrying the text field (streaming calls)
    Json(String),
    /// An already-parsed event object carrying the text field
    Event(serde_json::Value),
    /// Raw bytes in an encoding the client does not recognize
    Bytes(Vec<u8>),
}

/// Lazy sequence of chunks produced by one generation call
///
/// An `Err` item is a backend failure; the stream ending is end-of-response.
pub type ChunkStream = BoxStream<'static, anyhow::Result<Chunk>>;

/// Language-model backend
///
/// Implement this trait to add support for different providers.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Backend name for logs (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Start generating a response to `prompt` with `model`
    ///
    /// Errors returned here are call-time failures; failures after the
    /// first chunk arrive as `Err` items on the stream.
    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<ChunkStream>;

    /// Model identifiers, in the order the backend reports them
    async fn list_models(&self) -> anyhow::Result<Vec<String>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

/// Backend connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Server host address
    pub host: String,
    /// Server port number
    pub port: u16,
    /// Request a chunked (streaming) response
    pub stream: bool,
    /// Field of each event object that carries the text
    pub text_field: String,
    /// Whole-request timeout in seconds (0 = no timeout)
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            stream: true,
            text_field: "response".to_string(),
            request_timeout_secs: 0,
        }
    }
}

impl BackendConfig {
    /// Create configuration for a host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set request timeout (0 disables it)
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Base URL of the server
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
