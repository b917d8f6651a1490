//! Streaming Session
//!
//! One generation attempt. A session snapshots the conversation, renders the
//! prompt, and drives the backend on a spawned task. The task decodes chunks
//! and pushes them through a per-session channel; the owner drains that
//! channel on its own thread, so the conversation is only ever mutated
//! there.
//!
//! # State Machine
//!
//! ```text
//!            start()              first fragment
//!   Idle ─────────────► Requesting ─────────────► Streaming ──┐ fragment
//!    │                      │  │                     │  │  ◄──┘
//!    │                      │  └─── end of stream ───┼──┼──────► Completed
//!    │                      └────── backend error ───┼──┴──────► Failed
//!    └──────────────────── stop() ───────────────────┴─────────► Cancelled
//! ```
//!
//! Terminal states are final. After a terminal event the session yields
//! nothing more.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::decoder::ChunkDecoder;
use crate::backend::BackendClient;
use crate::conversation::ConversationState;
use crate::error::SessionError;
use crate::messages::{Message, SessionId};
use crate::prompt::PromptSerializer;

/// Default capacity of the worker → owner channel
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Created, not started
    Idle,
    /// Request submitted, no chunk yet
    Requesting,
    /// At least one chunk received
    Streaming,
    /// Response finished and appended to the conversation
    Completed,
    /// Backend failed
    Failed,
    /// Stopped by the owner
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can no longer change state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Events a session yields to its owner, in production order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Decoded fragment
    Fragment(String),
    /// Full response; already appended to the conversation
    Completed(String),
    /// Diagnostic for a backend failure
    Failed(String),
    /// The session was stopped
    Cancelled,
}

impl SessionEvent {
    /// Whether this event ends the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment(_))
    }
}

/// What the worker task reports
#[derive(Debug)]
enum WorkerEvent {
    Fragment(String),
    Finished,
    Failed(String),
}

/// A single generation attempt
pub struct StreamingSession {
    id: SessionId,
    model_name: String,
    snapshot: Vec<Message>,
    accumulated_text: String,
    status: SessionStatus,
    decoder: ChunkDecoder,
    event_buffer: usize,
    fragments: u32,
    started_at: Option<Instant>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    events: Option<mpsc::Receiver<WorkerEvent>>,
}

impl StreamingSession {
    /// Create an idle session for `model_name`
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            model_name: model_name.into(),
            snapshot: Vec::new(),
            accumulated_text: String::new(),
            status: SessionStatus::Idle,
            decoder: ChunkDecoder::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            fragments: 0,
            started_at: None,
            cancel: CancellationToken::new(),
            worker: None,
            events: None,
        }
    }

    /// Use a specific decoder (shares its anomaly counter)
    #[must_use]
    pub fn with_decoder(mut self, decoder: ChunkDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Set the worker channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Model this session generates with
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Messages captured at `start()`
    #[must_use]
    pub fn snapshot(&self) -> &[Message] {
        &self.snapshot
    }

    /// Text received so far
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether the session has started and not yet ended
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Requesting | SessionStatus::Streaming
        )
    }

    /// Snapshot `conversation`, render the prompt and spawn the worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<B>(
        &mut self,
        conversation: &ConversationState,
        backend: Arc<B>,
    ) -> Result<(), SessionError>
    where
        B: BackendClient + ?Sized + 'static,
    {
        if self.status != SessionStatus::Idle {
            return Err(SessionError::AlreadyStarted {
                status: self.status,
            });
        }

        self.snapshot = conversation.snapshot();
        let prompt = PromptSerializer::render(&self.snapshot);

        tracing::info!(
            session_id = %self.id,
            model = %self.model_name,
            backend = backend.name(),
            messages = self.snapshot.len(),
            "Starting generation"
        );
        tracing::debug!(session_id = %self.id, prompt = %prompt, "Rendered prompt");

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let worker = tokio::spawn(run_worker(
            backend,
            self.model_name.clone(),
            prompt,
            self.decoder.clone(),
            self.cancel.clone(),
            tx,
        ));

        self.events = Some(rx);
        self.worker = Some(worker);
        self.started_at = Some(Instant::now());
        self.status = SessionStatus::Requesting;
        Ok(())
    }

    /// Wait for the next event, applying it to `conversation` on completion
    ///
    /// Returns `None` once the session is idle or terminal.
    pub async fn next_event(
        &mut self,
        conversation: &mut ConversationState,
    ) -> Option<SessionEvent> {
        if !self.is_active() {
            return None;
        }
        let received = self.events.as_mut()?.recv().await;
        Some(self.apply(received, conversation))
    }

    /// Take the next event if one is ready, without waiting
    pub fn try_next_event(&mut self, conversation: &mut ConversationState) -> Option<SessionEvent> {
        if !self.is_active() {
            return None;
        }
        let received = match self.events.as_mut()?.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => None,
        };
        Some(self.apply(received, conversation))
    }

    /// Cancel the session and wait for its worker to exit
    ///
    /// Returns `Some(Cancelled)` the first time it ends a non-terminal
    /// session and `None` afterwards. Events the worker had already queued
    /// are dropped.
    pub async fn stop(&mut self) -> Option<SessionEvent> {
        if self.status.is_terminal() {
            return None;
        }

        self.cancel.cancel();
        self.events = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    tracing::warn!(session_id = %self.id, "Generation worker panicked");
                }
            }
        }

        tracing::info!(
            session_id = %self.id,
            fragments = self.fragments,
            "Generation cancelled"
        );
        self.status = SessionStatus::Cancelled;
        Some(SessionEvent::Cancelled)
    }

    fn apply(
        &mut self,
        received: Option<WorkerEvent>,
        conversation: &mut ConversationState,
    ) -> SessionEvent {
        match received {
            Some(WorkerEvent::Fragment(text)) => {
                if self.status == SessionStatus::Requesting {
                    self.status = SessionStatus::Streaming;
                }
                self.fragments += 1;
                self.accumulated_text.push_str(&text);
                SessionEvent::Fragment(text)
            }
            Some(WorkerEvent::Finished) => {
                conversation.append(Message::assistant(self.accumulated_text.clone()));
                self.finish(SessionStatus::Completed);
                tracing::info!(
                    session_id = %self.id,
                    fragments = self.fragments,
                    chars = self.accumulated_text.chars().count(),
                    elapsed_ms = self.elapsed_ms(),
                    "Generation completed"
                );
                SessionEvent::Completed(self.accumulated_text.clone())
            }
            Some(WorkerEvent::Failed(error)) => {
                self.finish(SessionStatus::Failed);
                tracing::warn!(session_id = %self.id, error = %error, "Generation failed");
                SessionEvent::Failed(error)
            }
            None => {
                let error = "generation worker exited unexpectedly".to_string();
                self.finish(SessionStatus::Failed);
                tracing::warn!(session_id = %self.id, error = %error, "Generation failed");
                SessionEvent::Failed(error)
            }
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.events = None;
        // The worker returns right after its terminal event
        self.worker = None;
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.id)
            .field("model_name", &self.model_name)
            .field("status", &self.status)
            .field("snapshot_len", &self.snapshot.len())
            .field("accumulated_chars", &self.accumulated_text.len())
            .finish_non_exhaustive()
    }
}

/// Background half of a session
///
/// Checks the cancellation token before every await point that can block,
/// so a cancelled worker never sends another event.
async fn run_worker<B>(
    backend: Arc<B>,
    model: String,
    prompt: String,
    decoder: ChunkDecoder,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerEvent>,
) where
    B: BackendClient + ?Sized,
{
    let call = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        call = backend.generate(&model, &prompt) => call,
    };

    let mut chunks = match call {
        Ok(chunks) => chunks,
        Err(e) => {
            let _ = tx.send(WorkerEvent::Failed(format!("{e:#}"))).await;
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = chunks.next() => next,
        };

        let event = match next {
            Some(Ok(chunk)) => WorkerEvent::Fragment(decoder.decode(chunk)),
            Some(Err(e)) => WorkerEvent::Failed(format!("{e:#}")),
            None => WorkerEvent::Finished,
        };
        let terminal = !matches!(event, WorkerEvent::Fragment(_));

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            sent = tx.send(event) => sent,
        };

        if sent.is_err() || terminal {
            return;
        }
    }
}
