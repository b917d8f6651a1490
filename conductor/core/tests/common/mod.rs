//! Fake backends shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use chat_conductor::{BackendClient, ChatEvent, Chunk, ChunkStream, Conductor, ConductorConfig};

/// How a scripted stream behaves
#[derive(Clone, Debug, Default)]
pub struct Script {
    /// Chunks yielded in order
    pub chunks: Vec<Chunk>,
    /// Error yielded after the chunks, instead of ending normally
    pub fail_with: Option<String>,
    /// Error returned from the call itself, before any chunk
    pub refuse_with: Option<String>,
    /// Pause before each chunk
    pub delay: Duration,
    /// Never end after the chunks
    pub hang: bool,
}

impl Script {
    pub fn text(fragments: &[&str]) -> Self {
        Self {
            chunks: fragments.iter().map(|f| Chunk::Text((*f).to_string())).collect(),
            ..Default::default()
        }
    }

    pub fn failing(mut self, error: &str) -> Self {
        self.fail_with = Some(error.to_string());
        self
    }

    pub fn refused(error: &str) -> Self {
        Self {
            refuse_with: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Backend that replays one script per `generate` call
///
/// Calls beyond the last script reuse the last one.
pub struct ScriptedBackend {
    scripts: Vec<Script>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    models: Vec<String>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            models: vec!["llama2".to_string(), "mistral".to_string()],
        }
    }

    pub fn single(script: Script) -> Self {
        Self::new(vec![script])
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, _model: &str, prompt: &str) -> anyhow::Result<ChunkStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(call)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default();

        if let Some(error) = script.refuse_with {
            anyhow::bail!(error);
        }

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for chunk in script.chunks {
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if let Some(error) = script.fail_with {
                let _ = tx.send(Err(anyhow::anyhow!(error))).await;
            } else if script.hang {
                tx.closed().await;
            }
        });

        Ok(tokio_stream::wrappers::ReceiverStream::new(rx).boxed())
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.models.clone())
    }
}

/// Conductor wired to a scripted backend and a consumer channel
pub fn conductor(
    backend: ScriptedBackend,
    budget: usize,
) -> (
    Conductor<ScriptedBackend>,
    Arc<ScriptedBackend>,
    mpsc::Receiver<ChatEvent>,
) {
    let backend = Arc::new(backend);
    let (tx, rx) = mpsc::channel(256);
    let config = ConductorConfig {
        context_budget: budget,
        ..Default::default()
    };
    (Conductor::from_arc(Arc::clone(&backend), config, tx), backend, rx)
}

/// Drive the active session to its end
pub async fn run_to_end(conductor: &mut Conductor<ScriptedBackend>) {
    while conductor.next_event().await.is_some() {}
}

/// Yield until the backend has seen `n` calls
///
/// A worker cancelled before it first runs never calls the backend, so
/// tests that rely on the script order wait for the call to land.
pub async fn wait_for_calls(backend: &ScriptedBackend, n: usize) {
    while backend.calls() < n {
        tokio::task::yield_now().await;
    }
}

/// Everything the consumer has received so far
pub fn received(rx: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
