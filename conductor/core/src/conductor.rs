//! Conductor - The Coordinator
//!
//! The Conductor owns the conversation and the (at most one) active
//! generation session. It is the inbound surface of the core:
//! - append user messages and trim the log to the context budget
//! - start, cancel and restart generation
//! - forward session output to the single registered consumer
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It never renders anything; it pushes
//! [`ChatEvent`]s down a channel and the consumer decides how to show them.
//! All conversation mutations happen on the thread that drives the
//! Conductor, and because only one session can be active at a time, the
//! session's completion append never races another writer.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::BackendClient;
use crate::config::ConductorConfig;
use crate::conversation::ConversationState;
use crate::error::ConductorError;
use crate::messages::{ChatEvent, SessionId};
use crate::prompt::analysis_prompt;
use crate::streaming::{ChunkDecoder, SessionEvent, SessionStatus, StreamingSession};

/// The Conductor - single-threaded coordinator
pub struct Conductor<B: BackendClient + 'static> {
    /// Configuration
    config: ConductorConfig,
    /// Language-model backend
    backend: Arc<B>,
    /// The conversation log
    conversation: ConversationState,
    /// Current or most recent session
    session: Option<StreamingSession>,
    /// Shared across sessions so anomalies accumulate
    decoder: ChunkDecoder,
    /// Channel to the consumer
    tx: mpsc::Sender<ChatEvent>,
    /// Event taken from the session whose forward was interrupted
    unsent: Option<ChatEvent>,
}

impl<B: BackendClient + 'static> Conductor<B> {
    /// Create a new Conductor with the given backend
    pub fn new(backend: B, config: ConductorConfig, tx: mpsc::Sender<ChatEvent>) -> Self {
        Self::from_arc(Arc::new(backend), config, tx)
    }

    /// Create a new Conductor around a shared backend
    pub fn from_arc(backend: Arc<B>, config: ConductorConfig, tx: mpsc::Sender<ChatEvent>) -> Self {
        let conversation = ConversationState::new(config.context_budget);
        let decoder = ChunkDecoder::new(config.backend.text_field.clone());

        Self {
            config,
            backend,
            conversation,
            session: None,
            unsent: None,
            decoder,
            tx,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    /// The conversation log
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Model used by [`Self::send_message`] and [`Self::request_analysis`]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Change the default model
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
        tracing::info!(model = %self.config.model, "Selected model changed");
    }

    /// Current or most recent session
    pub fn session(&self) -> Option<&StreamingSession> {
        self.session.as_ref()
    }

    /// Status of the current or most recent session
    pub fn session_status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(StreamingSession::status)
    }

    /// Whether a session is generating right now
    pub fn is_generating(&self) -> bool {
        self.session.as_ref().is_some_and(StreamingSession::is_active)
    }

    /// Chunks that needed recovery across all sessions
    pub fn decode_anomalies(&self) -> u64 {
        self.decoder.anomalies()
    }

    /// Models the backend offers
    pub async fn list_models(&self) -> Result<Vec<String>, ConductorError> {
        let models = self.backend.list_models().await?;
        tracing::info!(count = models.len(), "Loaded models");
        Ok(models)
    }

    /// Append a user message, then trim to the context budget
    ///
    /// Returns the number of messages trimmed.
    pub fn append_user_message(&mut self, text: impl Into<String>) -> Result<usize, ConductorError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConductorError::EmptyMessage);
        }
        self.conversation.append_user(text);
        Ok(self.conversation.trim())
    }

    /// Content of the most recent user message
    pub fn get_last_user_message(&self) -> Option<&str> {
        self.conversation.last_user_message()
    }

    /// Set the context budget and trim to it
    ///
    /// Returns the number of messages trimmed. A zero budget is rejected and
    /// leaves the current one in place.
    pub fn trim(&mut self, budget: usize) -> Result<usize, ConductorError> {
        if budget == 0 {
            return Err(ConductorError::InvalidBudget);
        }
        self.config.context_budget = budget;
        Ok(self.conversation.trim_to(budget))
    }

    /// Start generating a response with `model_name`
    ///
    /// Any active session is cancelled, and its worker joined, first.
    pub async fn start_generation(
        &mut self,
        model_name: impl Into<String>,
    ) -> Result<SessionId, ConductorError> {
        self.cancel_generation().await;

        let mut session = StreamingSession::new(model_name)
            .with_decoder(self.decoder.clone())
            .with_event_buffer(self.config.event_buffer);
        session.start(&self.conversation, Arc::clone(&self.backend))?;

        let id = session.id().clone();
        self.session = Some(session);
        Ok(id)
    }

    /// Cancel the active session, if any
    ///
    /// Emits `Cancelled` only when a session was actually stopped; calling
    /// this again is a no-op. Returns whether a session was stopped.
    pub async fn cancel_generation(&mut self) -> bool {
        self.flush_unsent().await;
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(event) = session.stop().await else {
            return false;
        };

        let chat_event = to_chat_event(session.id().clone(), event);
        self.send(chat_event).await;
        true
    }

    /// Append `text` as a user message and generate with the default model
    pub async fn send_message(
        &mut self,
        text: impl Into<String>,
    ) -> Result<SessionId, ConductorError> {
        let text = text.into();
        self.append_user_message(text.as_str())?;
        tracing::info!(chars = text.chars().count(), "Sending message");
        let model = self.config.model.clone();
        self.start_generation(model).await
    }

    /// Ask the model to perform `analysis_type` on some text
    ///
    /// Uses `selection` when it is non-empty, otherwise the last user
    /// message.
    pub async fn request_analysis(
        &mut self,
        analysis_type: &str,
        selection: Option<&str>,
    ) -> Result<SessionId, ConductorError> {
        let text = match selection.filter(|s| !s.trim().is_empty()) {
            Some(selected) => selected.to_string(),
            None => self
                .get_last_user_message()
                .filter(|s| !s.is_empty())
                .ok_or(ConductorError::NothingToAnalyze)?
                .to_string(),
        };

        tracing::info!(analysis = analysis_type, "Requesting analysis");
        self.send_message(analysis_prompt(analysis_type, &text)).await
    }

    /// Cancel any active session and clear the conversation
    pub async fn stop_chat(&mut self) {
        self.cancel_generation().await;
        self.conversation.clear();
        tracing::info!("Chat stopped and cleared");
    }

    /// Stop and clear, ready for a fresh conversation
    pub async fn restart_chat(&mut self) {
        self.stop_chat().await;
        tracing::info!("Chat restarted");
    }

    /// Wait for the next event of the active session and forward it
    ///
    /// Returns `None` when no session is active. Cancel safe: if this future
    /// is dropped while the consumer channel is full, the event is kept and
    /// forwarded by the next call.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let chat_event = match self.unsent.take() {
            Some(event) => event,
            None => {
                let session = self.session.as_mut()?;
                let event = session.next_event(&mut self.conversation).await?;
                to_chat_event(session.id().clone(), event)
            }
        };

        self.unsent = Some(chat_event.clone());
        self.send(chat_event.clone()).await;
        self.unsent = None;
        Some(chat_event)
    }

    /// Forward every event that is ready right now
    ///
    /// Call this regularly from a frame loop. Returns true if there was
    /// activity.
    pub async fn poll_streaming(&mut self) -> bool {
        let mut ready: Vec<ChatEvent> = self.unsent.take().into_iter().collect();
        if let Some(session) = self.session.as_mut() {
            while let Some(event) = session.try_next_event(&mut self.conversation) {
                ready.push(to_chat_event(session.id().clone(), event));
            }
        }

        let active = !ready.is_empty();
        for event in ready {
            self.send(event).await;
        }
        active
    }

    /// Cancel any active session before the Conductor goes away
    pub async fn shutdown(&mut self) {
        self.cancel_generation().await;
        tracing::info!("Conductor shut down");
    }

    /// Forward an event left over from an interrupted `next_event`
    async fn flush_unsent(&mut self) {
        if let Some(event) = self.unsent.take() {
            self.send(event).await;
        }
    }

    /// Send an event to the consumer
    async fn send(&self, event: ChatEvent) {
        if let Err(e) = self.tx.send(event).await {
            tracing::warn!("Failed to send event to consumer: {}", e);
        }
    }
}

fn to_chat_event(session_id: SessionId, event: SessionEvent) -> ChatEvent {
    match event {
        SessionEvent::Fragment(text) => ChatEvent::Fragment { session_id, text },
        SessionEvent::Completed(full_text) => ChatEvent::Completed {
            session_id,
            full_text,
        },
        SessionEvent::Failed(error) => ChatEvent::Failed { session_id, error },
        SessionEvent::Cancelled => ChatEvent::Cancelled { session_id },
    }
}
