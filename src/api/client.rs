use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::error::ChatError;
use crate::types::ChatRequest;
use crate::util::join_url;
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const CHAT_PATH: &str = "/api/chat";
const HEALTH_PATH: &str = "/api/health";
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// What the server sent back for a chat request.
pub enum ChatResponse {
    /// `text/event-stream` body, read lazily.
    Stream(ByteStream),
    /// Any other body, read in full.
    Complete(Bytes),
}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_response(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim().to_string(),
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "http://127.0.0.1:8080".to_string(),
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat request. Non-success statuses come back as
    /// [`ChatError::Http`], connection failures as [`ChatError::Transport`].
    pub async fn open(&self, request: &ChatRequest) -> Result<ChatResponse> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_response(request);
            }
        }

        let request_url = join_url(&self.base_url, CHAT_PATH);
        if debug_payload_enabled() {
            let payload = serde_json::to_value(request)?;
            emit_debug_payload(&request_url, &payload);
        }
        tracing::info!(
            url = %request_url,
            messages = request.messages.len(),
            stream = request.stream,
            tools = request.mcp_config.is_some(),
            "sending chat request"
        );

        let response = self
            .http
            .post(&request_url)
            .json(request)
            .send()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            tracing::warn!(status = status.as_u16(), %detail, "chat request rejected");
            return Err(ChatError::Http {
                status: status.as_u16(),
                detail,
            }
            .into());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(EVENT_STREAM_MIME));

        if is_event_stream {
            let request_url_for_stream = request_url.clone();
            let stream = response.bytes_stream().map(move |item| {
                item.map_err(|error| map_request_error(error, &request_url_for_stream))
            });
            return Ok(ChatResponse::Stream(Box::pin(stream)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;
        Ok(ChatResponse::Complete(body))
    }

    /// `GET /api/health`; any non-success status is an error.
    pub async fn health_check(&self) -> Result<()> {
        #[cfg(test)]
        {
            if self.mock_stream_producer.is_some() {
                return Ok(());
            }
        }

        let request_url = join_url(&self.base_url, HEALTH_PATH);
        let response = self
            .http
            .get(&request_url)
            .send()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Http {
                status: status.as_u16(),
                detail: "health check failed".to_string(),
            }
            .into());
        }
        tracing::debug!(url = %request_url, "server healthy");
        Ok(())
    }
}

/// The server's `detail` field when the body is JSON, otherwise the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    let message = if error.is_connect() {
        format!("cannot reach chat server '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("request to '{request_url}' timed out: {error}")
    } else if error.is_body() || error.is_decode() {
        format!("response from '{request_url}' was interrupted: {error}")
    } else {
        format!("request to '{request_url}' failed: {error}")
    };
    ChatError::Transport(message).into()
}
