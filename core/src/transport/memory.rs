use super::{effective_limit, AgentTransport, ClientError};
use crate::model::{Health, Message, MessageInfo, MessageTime, Role, Session, SessionTime};
use crate::parts::Part;
use crate::providers::{ModelSelection, ProviderDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const MEMORY_URL: &str = "memory://relay";

/// A request as observed by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Health,
    ListSessions,
    CreateSession {
        title: Option<String>,
    },
    GetSession(String),
    DeleteSession(String),
    Messages {
        session_id: String,
        limit: Option<u32>,
    },
    SendMessage {
        session_id: String,
        prompt: String,
        model: Option<ModelSelection>,
    },
    Abort(String),
    Providers,
}

#[derive(Clone)]
enum Reply {
    Echo,
    Parts(Vec<Part>),
}

struct MemoryState {
    healthy: bool,
    reachable: bool,
    version: String,
    send_failure: Option<u16>,
    reply: Reply,
    sessions: Vec<Session>,
    messages: HashMap<String, Vec<Message>>,
    providers: ProviderDirectory,
    calls: Vec<TransportCall>,
    clock: DateTime<Utc>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            healthy: true,
            reachable: true,
            version: "memory".to_string(),
            send_failure: None,
            reply: Reply::Echo,
            sessions: Vec::new(),
            messages: HashMap::new(),
            providers: ProviderDirectory::default(),
            calls: Vec::new(),
            clock: Utc::now(),
        }
    }
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock = (self.clock + Duration::milliseconds(1)).max(Utc::now());
        self.clock
    }

    fn session_mut(&mut self, id: &str, path: &str) -> Result<&mut Session, ClientError> {
        self.sessions
            .iter_mut()
            .find(|session| session.id == id)
            .ok_or_else(|| not_found(path))
    }

    fn new_message(&mut self, session_id: &str, role: Role, parts: Vec<Part>) -> Message {
        let created = self.tick();
        Message {
            info: MessageInfo {
                id: format!("msg_{}", Uuid::new_v4().simple()),
                session_id: session_id.to_string(),
                role,
                time: MessageTime { created },
            },
            parts,
        }
    }
}

/// An in-process stand-in for the agent server.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// inspection while the orchestrator owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(self, providers: ProviderDirectory) -> Self {
        self.state.lock().providers = providers;
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = healthy;
    }

    /// Makes every call fail as if the server were not listening.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().reachable = !unreachable;
    }

    /// Makes `send_message` answer with the given HTTP status.
    pub fn fail_sends_with(&self, status: Option<u16>) {
        self.state.lock().send_failure = status;
    }

    pub fn set_reply_parts(&self, parts: Vec<Part>) {
        self.state.lock().reply = Reply::Parts(parts);
    }

    pub fn set_reply_text(&self, text: impl Into<String>) {
        self.set_reply_parts(vec![Part::text(text)]);
    }

    pub fn insert_session(&self, session: Session) {
        let mut state = self.state.lock();
        state.messages.entry(session.id.clone()).or_default();
        state.sessions.push(session);
    }

    pub fn insert_message(&self, message: Message) {
        self.state
            .lock()
            .messages
            .entry(message.info.session_id.clone())
            .or_default()
            .push(message);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|session| session.id.clone())
            .collect()
    }

    fn record(&self, call: TransportCall) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.reachable {
            Ok(())
        } else {
            Err(ClientError::Connection {
                url: MEMORY_URL.to_string(),
                source: None,
            })
        }
    }
}

fn not_found(path: &str) -> ClientError {
    ClientError::RequestFailed {
        status: 404,
        reason: "Not Found".to_string(),
        path: path.to_string(),
    }
}

#[async_trait]
impl AgentTransport for MemoryTransport {
    async fn health(&self) -> Result<Health, ClientError> {
        self.record(TransportCall::Health)?;
        let state = self.state.lock();
        Ok(Health {
            healthy: state.healthy,
            version: state.version.clone(),
        })
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.record(TransportCall::ListSessions)?;
        Ok(self.state.lock().sessions.clone())
    }

    async fn create_session(&self, title: Option<&str>) -> Result<Session, ClientError> {
        self.record(TransportCall::CreateSession {
            title: title.map(str::to_owned),
        })?;
        let mut state = self.state.lock();
        let now = state.tick();
        let session = Session {
            id: format!("ses_{}", Uuid::new_v4().simple()),
            title: title.map(str::to_owned),
            time: SessionTime::at(now),
            share: None,
            parent_id: None,
            version: Some(state.version.clone()),
        };
        state.messages.insert(session.id.clone(), Vec::new());
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session, ClientError> {
        self.record(TransportCall::GetSession(id.to_string()))?;
        let mut state = self.state.lock();
        state
            .session_mut(id, &format!("/session/{id}"))
            .map(|session| session.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, ClientError> {
        self.record(TransportCall::DeleteSession(id.to_string()))?;
        let mut state = self.state.lock();
        let position = state
            .sessions
            .iter()
            .position(|session| session.id == id)
            .ok_or_else(|| not_found(&format!("/session/{id}")))?;
        state.sessions.remove(position);
        state.messages.remove(id);
        Ok(true)
    }

    async fn messages(&self, id: &str, limit: Option<u32>) -> Result<Vec<Message>, ClientError> {
        self.record(TransportCall::Messages {
            session_id: id.to_string(),
            limit,
        })?;
        let mut state = self.state.lock();
        state.session_mut(id, &format!("/session/{id}/message"))?;
        let messages = state.messages.get(id).cloned().unwrap_or_default();
        let skip = match effective_limit(limit) {
            Some(limit) => messages.len().saturating_sub(limit as usize),
            None => 0,
        };
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn send_message(
        &self,
        id: &str,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> Result<Message, ClientError> {
        self.record(TransportCall::SendMessage {
            session_id: id.to_string(),
            prompt: prompt.to_string(),
            model: model.cloned(),
        })?;
        let mut state = self.state.lock();
        let path = format!("/session/{id}/message");
        if let Some(status) = state.send_failure {
            return Err(ClientError::RequestFailed {
                status,
                reason: "Injected Failure".to_string(),
                path,
            });
        }
        state.session_mut(id, &path)?;

        let reply_parts = match &state.reply {
            Reply::Echo => vec![Part::text(format!("echo: {prompt}"))],
            Reply::Parts(parts) => parts.clone(),
        };
        let question = state.new_message(id, Role::User, vec![Part::text(prompt)]);
        let answer = state.new_message(id, Role::Assistant, reply_parts);
        let updated = answer.info.time.created;
        state.session_mut(id, &path)?.time.updated = updated;
        let history = state.messages.entry(id.to_string()).or_default();
        history.push(question);
        history.push(answer.clone());
        Ok(answer)
    }

    async fn abort(&self, id: &str) -> Result<bool, ClientError> {
        self.record(TransportCall::Abort(id.to_string()))?;
        let mut state = self.state.lock();
        state.session_mut(id, &format!("/session/{id}/abort"))?;
        Ok(true)
    }

    async fn providers(&self) -> Result<ProviderDirectory, ClientError> {
        self.record(TransportCall::Providers)?;
        Ok(self.state.lock().providers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_appends_user_and_assistant_messages() {
        let transport = MemoryTransport::new();
        let session = transport.create_session(Some("t")).await.unwrap();
        let reply = transport.send_message(&session.id, "hi", None).await.unwrap();
        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.text(), "echo: hi");

        let history = transport.messages(&session.id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role(), Role::User);
        let refreshed = transport.get_session(&session.id).await.unwrap();
        assert!(refreshed.updated_at() > session.updated_at());
    }

    #[tokio::test]
    async fn limit_keeps_most_recent_messages() {
        let transport = MemoryTransport::new();
        let session = transport.create_session(None).await.unwrap();
        for prompt in ["one", "two", "three"] {
            transport.send_message(&session.id, prompt, None).await.unwrap();
        }
        let last = transport.messages(&session.id, Some(2)).await.unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1].text(), "echo: three");
        let all = transport.messages(&session.id, Some(0)).await.unwrap();
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn deleted_session_answers_not_found() {
        let transport = MemoryTransport::new();
        let session = transport.create_session(None).await.unwrap();
        assert!(transport.delete_session(&session.id).await.unwrap());
        let err = transport.get_session(&session.id).await.unwrap_err();
        assert!(err.is_not_found());
        let err = transport.delete_session(&session.id).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn unreachable_server_refuses_every_call() {
        let transport = MemoryTransport::new();
        transport.set_unreachable(true);
        assert!(transport.health().await.unwrap_err().is_connection_refused());
        assert!(transport.list_sessions().await.unwrap_err().is_connection_refused());
        assert_eq!(
            transport.calls(),
            vec![TransportCall::Health, TransportCall::ListSessions]
        );
    }
}
