//! Chat request/response collaborator
//!
//! The wire contract: a POST carrying `{model, messages, key, prompt,
//! temperature}`; the response is either a byte stream (default) or a JSON
//! envelope `{answer}` in plugin mode. Non-2xx responses carry a status
//! text string. A request-kill side channel keyed by request id stops
//! server-side work after a client abort.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::Message;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Malformed plugin envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Response body as an opaque UTF-8 byte sequence, decoded incrementally
/// by the controller.
pub type ByteStream = BoxStream<'static, ChatResult<Vec<u8>>>;

/// An alternate response mode that returns one complete JSON answer
/// instead of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
}

/// Single JSON envelope returned by plugin-mode responses.
#[derive(Debug, Deserialize)]
pub struct PluginEnvelope {
    pub answer: String,
}

/// Request body sent to the chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<Message>,
    pub key: String,
    pub prompt: String,
    pub temperature: f32,
}

/// Transport seam for the chat endpoint. The HTTP implementation is
/// production; tests substitute scripted streams.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the chat request. A non-2xx response surfaces as
    /// [`ChatError::Api`] carrying the status text.
    async fn send(&self, request_id: &str, body: &ChatRequestBody) -> ChatResult<ByteStream>;

    /// Best-effort request-kill side channel for stopping server-side work
    /// after a client abort. Errors are logged, never propagated.
    async fn kill(&self, request_id: &str);
}

/// reqwest-backed chat transport.
pub struct HttpChatTransport {
    client: reqwest::Client,
    endpoint: String,
    kill_endpoint: Option<String>,
}

impl HttpChatTransport {
    pub fn new(endpoint: impl Into<String>, kill_endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            kill_endpoint,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&self, request_id: &str, body: &ChatRequestBody) -> ChatResult<ByteStream> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-request-id", request_id)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string(),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ChatError::from));

        Ok(stream.boxed())
    }

    async fn kill(&self, request_id: &str) {
        let Some(endpoint) = &self.kill_endpoint else {
            return;
        };

        let result = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "request_id": request_id }))
            .send()
            .await;

        if let Err(e) = result {
            debug!(request_id = %request_id, error = %e, "Kill request failed");
        }
    }
}
