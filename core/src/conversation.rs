use crate::model::{Health, Message, Role, Session};
use crate::providers::{ModelSelection, ProviderDirectory};
use crate::transport::{AgentTransport, ClientError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown in place of an assistant reply that carried no visible text.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no response)";

const TITLE_MAX_CHARS: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum ConversationError {
    #[error("{0}")]
    Validation(String),
    #[error("opencode server is not running at {base_url}")]
    ServerUnavailable { base_url: String },
    #[error("opencode server {version} reported itself unhealthy")]
    Unhealthy { version: String },
    #[error("session {0} has been deleted")]
    Closed(String),
    #[error(transparent)]
    Transport(#[from] ClientError),
}

impl ConversationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(detail) => detail.clone(),
            Self::ServerUnavailable { base_url } => format!(
                "Cannot reach the opencode server at {base_url}. Start it with `opencode serve` and try again."
            ),
            Self::Unhealthy { version } => {
                format!("The opencode server ({version}) is running but not healthy.")
            }
            Self::Closed(id) => format!("Session {id} was deleted; start a new conversation."),
            Self::Transport(err) => err.to_string(),
        }
    }
}

pub type ConversationResult<T> = Result<T, ConversationError>;

/// One line of the local transcript.
///
/// `pending` marks a user entry appended before the server confirmed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub pending: bool,
}

impl TranscriptEntry {
    pub fn confirmed(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            pending: false,
        }
    }

    pub fn pending(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            pending: true,
        }
    }

    /// Projects a server message, degrading empty text to the placeholder for
    /// assistant replies.
    pub fn from_message(message: &Message) -> Self {
        let text = message.text();
        let content = if text.is_empty() && message.role() == Role::Assistant {
            EMPTY_REPLY_PLACEHOLDER.to_string()
        } else {
            text
        };
        Self::confirmed(message.role(), content)
    }
}

/// The linear, role-tagged view of a conversation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: &[Message]) -> Self {
        Self {
            entries: messages.iter().map(TranscriptEntry::from_message).collect(),
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn push_confirmed(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry::confirmed(role, content));
    }

    pub fn push_pending(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry::pending(role, content));
    }

    /// Clears the pending flag on the most recent pending entry.
    pub fn confirm_last(&mut self) {
        if let Some(entry) = self.entries.iter_mut().rev().find(|entry| entry.pending) {
            entry.pending = false;
        }
    }

    /// Removes trailing pending entries, returning how many were dropped.
    pub fn rollback_pending(&mut self) -> usize {
        let before = self.entries.len();
        while self.entries.last().is_some_and(|entry| entry.pending) {
            self.entries.pop();
        }
        before - self.entries.len()
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|entry| entry.pending)
    }
}

/// `Idle -> Creating -> AwaitingFirstReply -> Active (Sending <-> Active) -> Closed`.
///
/// A failed start falls back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    Idle,
    Creating,
    AwaitingFirstReply,
    Sending,
    Active,
    Closed,
}

/// A session plus the transcript the current flow has built for it.
#[derive(Debug, Clone)]
pub struct Conversation {
    session: Session,
    transcript: Transcript,
    phase: ConversationPhase,
}

impl Conversation {
    pub fn new(session: Session, transcript: Transcript) -> Self {
        Self {
            session,
            transcript,
            phase: ConversationPhase::Active,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == ConversationPhase::Closed
    }

    fn ensure_open(&self) -> ConversationResult<()> {
        if self.is_closed() {
            return Err(ConversationError::Closed(self.session.id.clone()));
        }
        Ok(())
    }
}

/// Receives every phase a conversation enters, including the ones before a
/// `Conversation` value exists.
pub type PhaseListener = Arc<dyn Fn(ConversationPhase) + Send + Sync>;

/// Drives sessions on the agent server and keeps local transcripts in step.
///
/// Holds no cross-operation state; every call is independent and the last one
/// to finish wins.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn AgentTransport>,
    base_url: String,
    phase_listener: Option<PhaseListener>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn AgentTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            phase_listener: None,
        }
    }

    pub fn with_phase_listener(mut self, listener: PhaseListener) -> Self {
        self.phase_listener = Some(listener);
        self
    }

    pub fn transport(&self) -> &Arc<dyn AgentTransport> {
        &self.transport
    }

    pub async fn start_conversation(
        &self,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> ConversationResult<Conversation> {
        let prompt = require_prompt(prompt)?;
        self.enter(ConversationPhase::Idle);
        self.ensure_healthy().await?;

        let started = self.create_and_send(prompt, model).await;
        match &started {
            Ok(conversation) => self.enter(conversation.phase),
            Err(_) => self.enter(ConversationPhase::Idle),
        }
        started
    }

    async fn create_and_send(
        &self,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> ConversationResult<Conversation> {
        self.enter(ConversationPhase::Creating);
        let title = session_title(prompt);
        let session = self
            .transport
            .create_session(Some(&title))
            .await
            .map_err(|err| self.contextualize(err))?;
        info!(session_id = %session.id, "created session");

        self.enter(ConversationPhase::AwaitingFirstReply);
        let reply = self
            .transport
            .send_message(&session.id, prompt, model)
            .await
            .map_err(|err| self.contextualize(err))?;

        let mut transcript = Transcript::new();
        transcript.push_confirmed(Role::User, prompt);
        transcript.push_confirmed(Role::Assistant, assistant_text(&reply));
        Ok(Conversation::new(session, transcript))
    }

    /// Sends a follow-up prompt.
    ///
    /// The user entry is appended as pending before the request goes out. On
    /// failure it is left in place and the error is returned.
    pub async fn continue_conversation(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> ConversationResult<()> {
        let prompt = require_prompt(prompt)?;
        conversation.ensure_open()?;

        self.transition(conversation, ConversationPhase::Sending);
        conversation.transcript.push_pending(Role::User, prompt);
        let result = self
            .transport
            .send_message(&conversation.session.id, prompt, model)
            .await;
        self.transition(conversation, ConversationPhase::Active);

        let reply = result.map_err(|err| self.contextualize(err))?;
        conversation.transcript.confirm_last();
        conversation
            .transcript
            .push_confirmed(Role::Assistant, assistant_text(&reply));
        Ok(())
    }

    /// All sessions, most recently updated first. Ties keep server order.
    pub async fn browse_sessions(&self) -> ConversationResult<Vec<Session>> {
        let mut sessions = self
            .transport
            .list_sessions()
            .await
            .map_err(|err| self.contextualize(err))?;
        sort_sessions(&mut sessions);
        Ok(sessions)
    }

    pub async fn open_session(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> ConversationResult<Conversation> {
        let (session, messages) = futures::try_join!(
            self.transport.get_session(session_id),
            self.transport.messages(session_id, limit),
        )
        .map_err(|err| self.contextualize(err))?;
        debug!(session_id, count = messages.len(), "loaded session history");
        Ok(Conversation::new(session, Transcript::from_messages(&messages)))
    }

    /// Refetches the session object, replacing the local copy wholesale.
    pub async fn refresh(&self, conversation: &mut Conversation) -> ConversationResult<()> {
        conversation.ensure_open()?;
        conversation.session = self
            .transport
            .get_session(&conversation.session.id)
            .await
            .map_err(|err| self.contextualize(err))?;
        Ok(())
    }

    /// Deletes the conversation's session; the conversation is closed for good.
    pub async fn delete_session(&self, conversation: &mut Conversation) -> ConversationResult<()> {
        conversation.ensure_open()?;
        self.delete_session_by_id(&conversation.session.id).await?;
        self.transition(conversation, ConversationPhase::Closed);
        Ok(())
    }

    pub async fn delete_session_by_id(&self, session_id: &str) -> ConversationResult<bool> {
        let deleted = self
            .transport
            .delete_session(session_id)
            .await
            .map_err(|err| self.contextualize(err))?;
        info!(session_id, deleted, "deleted session");
        Ok(deleted)
    }

    pub async fn abort(&self, conversation: &Conversation) -> ConversationResult<bool> {
        conversation.ensure_open()?;
        self.abort_by_id(&conversation.session.id).await
    }

    pub async fn abort_by_id(&self, session_id: &str) -> ConversationResult<bool> {
        self.transport
            .abort(session_id)
            .await
            .map_err(|err| self.contextualize(err))
    }

    /// The model to pin prompts to, or `None` to let the server choose.
    pub async fn resolve_default_model(&self) -> ConversationResult<Option<ModelSelection>> {
        Ok(self.providers().await?.default_selection())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> ConversationResult<Health> {
        self.transport
            .health()
            .await
            .map_err(|err| self.contextualize(err))
    }

    pub async fn providers(&self) -> ConversationResult<ProviderDirectory> {
        self.transport
            .providers()
            .await
            .map_err(|err| self.contextualize(err))
    }

    async fn ensure_healthy(&self) -> ConversationResult<()> {
        let health = self.health().await?;
        if !health.healthy {
            return Err(ConversationError::Unhealthy {
                version: health.version,
            });
        }
        Ok(())
    }

    fn transition(&self, conversation: &mut Conversation, phase: ConversationPhase) {
        conversation.phase = phase;
        self.enter(phase);
    }

    fn enter(&self, phase: ConversationPhase) {
        debug!(?phase, "conversation phase");
        if let Some(listener) = &self.phase_listener {
            listener(phase);
        }
    }

    fn contextualize(&self, err: ClientError) -> ConversationError {
        if err.is_connection_refused() {
            ConversationError::ServerUnavailable {
                base_url: self.base_url.clone(),
            }
        } else {
            ConversationError::Transport(err)
        }
    }
}

fn require_prompt(prompt: &str) -> ConversationResult<&str> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ConversationError::Validation(
            "Prompt cannot be empty.".to_string(),
        ));
    }
    Ok(trimmed)
}

fn assistant_text(reply: &Message) -> String {
    let text = reply.text();
    if text.is_empty() {
        warn!(message_id = %reply.info.id, "assistant reply had no text");
        return EMPTY_REPLY_PLACEHOLDER.to_string();
    }
    text
}

/// The first 50 characters of the trimmed prompt.
pub fn session_title(prompt: &str) -> String {
    prompt.trim().chars().take(TITLE_MAX_CHARS).collect()
}

/// Stable sort, newest `updated` first.
pub fn sort_sessions(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
}
