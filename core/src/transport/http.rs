use super::{effective_limit, AgentTransport, ClientError};
use crate::config::ServerSettings;
use crate::model::{Health, Message, Session};
use crate::parts::Part;
use crate::providers::{ModelSelection, ProviderDirectory};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Account name the server pairs with its shared secret.
const SERVER_USERNAME: &str = "opencode";

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a ModelSelection>,
}

/// Talks to the agent server over plain HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl HttpTransport {
    pub fn new(settings: &ServerSettings) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(client: Client, settings: &ServerSettings) -> Result<Self, ClientError> {
        let authorization = settings
            .password
            .as_deref()
            .map(basic_credential)
            .transpose()?;
        Ok(Self {
            client,
            base_url: settings.base_url(),
            authorization,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_health(&self) -> Result<Request, ClientError> {
        self.build(Method::GET, "/global/health", None::<&()>, None)
    }

    pub fn build_list_sessions(&self) -> Result<Request, ClientError> {
        self.build(Method::GET, "/session", None::<&()>, None)
    }

    pub fn build_create_session(&self, title: Option<&str>) -> Result<Request, ClientError> {
        self.build(
            Method::POST,
            "/session",
            Some(&CreateSessionBody { title }),
            None,
        )
    }

    pub fn build_get_session(&self, id: &str) -> Result<Request, ClientError> {
        self.build(Method::GET, &format!("/session/{id}"), None::<&()>, None)
    }

    pub fn build_delete_session(&self, id: &str) -> Result<Request, ClientError> {
        self.build(Method::DELETE, &format!("/session/{id}"), None::<&()>, None)
    }

    pub fn build_messages(&self, id: &str, limit: Option<u32>) -> Result<Request, ClientError> {
        self.build(
            Method::GET,
            &format!("/session/{id}/message"),
            None::<&()>,
            effective_limit(limit),
        )
    }

    pub fn build_send_message(
        &self,
        id: &str,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> Result<Request, ClientError> {
        let body = SendMessageBody {
            parts: vec![Part::text(prompt)],
            model,
        };
        self.build(
            Method::POST,
            &format!("/session/{id}/message"),
            Some(&body),
            None,
        )
    }

    pub fn build_abort(&self, id: &str) -> Result<Request, ClientError> {
        self.build(
            Method::POST,
            &format!("/session/{id}/abort"),
            None::<&()>,
            None,
        )
    }

    pub fn build_providers(&self) -> Result<Request, ClientError> {
        self.build(Method::GET, "/config/providers", None::<&()>, None)
    }

    fn build<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        limit: Option<u32>,
    ) -> Result<Request, ClientError> {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(limit) = limit {
            builder = builder.query(&[("limit", limit)]);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        Ok(builder.build()?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<T, ClientError> {
        let path = request.url().path().to_string();
        debug!(method = %request.method(), %path, "sending request");
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| self.transport_error(err))?;
        let response = check_status(response, &path)?;
        response
            .json::<T>()
            .await
            .map_err(|source| ClientError::Decode { path, source })
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_connect() {
            ClientError::Connection {
                url: self.base_url.clone(),
                source: Some(err),
            }
        } else {
            ClientError::Http(err)
        }
    }
}

fn check_status(response: Response, path: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(status = status.as_u16(), %path, "request failed");
    Err(ClientError::RequestFailed {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
        path: path.to_string(),
    })
}

/// `Basic base64("opencode:<secret>")`, flagged sensitive so it never shows in logs.
fn basic_credential(secret: &str) -> Result<HeaderValue, ClientError> {
    let token = BASE64_STANDARD.encode(format!("{SERVER_USERNAME}:{secret}"));
    let mut value = HeaderValue::from_str(&format!("Basic {token}"))
        .map_err(|_| ClientError::InvalidCredential)?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn health(&self) -> Result<Health, ClientError> {
        self.execute(self.build_health()?).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.execute(self.build_list_sessions()?).await
    }

    async fn create_session(&self, title: Option<&str>) -> Result<Session, ClientError> {
        self.execute(self.build_create_session(title)?).await
    }

    async fn get_session(&self, id: &str) -> Result<Session, ClientError> {
        self.execute(self.build_get_session(id)?).await
    }

    async fn delete_session(&self, id: &str) -> Result<bool, ClientError> {
        self.execute(self.build_delete_session(id)?).await
    }

    async fn messages(&self, id: &str, limit: Option<u32>) -> Result<Vec<Message>, ClientError> {
        self.execute(self.build_messages(id, limit)?).await
    }

    async fn send_message(
        &self,
        id: &str,
        prompt: &str,
        model: Option<&ModelSelection>,
    ) -> Result<Message, ClientError> {
        self.execute(self.build_send_message(id, prompt, model)?)
            .await
    }

    async fn abort(&self, id: &str) -> Result<bool, ClientError> {
        self.execute(self.build_abort(id)?).await
    }

    async fn providers(&self) -> Result<ProviderDirectory, ClientError> {
        self.execute(self.build_providers()?).await
    }
}
