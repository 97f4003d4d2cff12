//! The seam between the orchestrator and the agent server.
//!
//! [`HttpTransport`] talks to a real server over HTTP; [`MemoryTransport`]
//! keeps sessions in process and backs the tests and the offline smoke run.

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, TransportCall};

use crate::model::{Health, Message, Session};
use crate::providers::{ModelSelection, ProviderDirectory};
use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("could not connect to {url}")]
    Connection {
        url: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    #[error("request to {path} failed: {status} {reason}")]
    RequestFailed {
        status: u16,
        reason: String,
        path: String,
    },
    #[error("unexpected response from {path}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server password cannot be sent as a header")]
    InvalidCredential,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Every operation issues exactly one request and surfaces failures as-is.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn health(&self) -> Result<Health, ClientError>;

    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError>;

    async fn create_session(&self, title: Option<&str>) -> Result<Session, ClientError>;

    async fn get_session(&self, id: &str) -> Result<Session, ClientError>;

    async fn delete_session(&self, id: &str) -> Result<bool, ClientError>;

    /// `Some(0)` is treated the same as `None`: no limit is applied.
    async fn messages(&self, id: &str, limit: Option<u32>) -> Result<Vec<Message>, ClientError>;

    async fn send_message(
        &self,
        id: &str,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> Result<Message, ClientError>;

    async fn abort(&self, id: &str) -> Result<bool, ClientError>;

    async fn providers(&self) -> Result<ProviderDirectory, ClientError>;
}

/// Normalizes a message limit; zero means unlimited.
pub fn effective_limit(limit: Option<u32>) -> Option<u32> {
    limit.filter(|limit| *limit > 0)
}
