use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::agent::error::AgentError;
use crate::agent::events::ToolResult;
use crate::agent::transport::{ByteStream, ChatRequest, ChatTransport, ToolResultsRequest};

const CHAT_PATH: &str = "/api/v1/agent/chat/hybrid";
const TOOL_RESULTS_PATH: &str = "/api/v1/agent/chat/tool-results";
const HEALTH_PATH: &str = "/health";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the agent service.
///
/// No overall timeout is set: chat streams stay open for as long as the agent works.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    access_token: Option<String>,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            access_token: access_token.filter(|token| !token.is_empty()),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Turn a status `accept` rejects into [`AgentError::Status`] carrying the body.
    async fn ensure_status(
        response: Response,
        accept: fn(StatusCode) -> bool,
    ) -> Result<Response, AgentError> {
        let status = response.status();
        if accept(status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AgentError::Status { status, body })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, AgentError> {
        let body = serde_json::to_vec(request).map_err(AgentError::Serialize)?;
        let url = self.url(CHAT_PATH);
        tracing::debug!(url = %url, conversation_id = ?request.conversation_id, "Opening chat stream");

        let builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body);
        let response = self.authorize(builder).send().await?;
        let response = Self::ensure_status(response, |status| status.is_success()).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AgentError::from));
        Ok(Box::pin(stream))
    }

    async fn send_tool_results(
        &self,
        conversation_id: &str,
        results: &[ToolResult],
    ) -> Result<(), AgentError> {
        let url = self.url(TOOL_RESULTS_PATH);
        tracing::debug!(url = %url, conversation_id, count = results.len(), "Sending tool results");

        let builder = self.client.post(&url).json(&ToolResultsRequest {
            conversation_id,
            tool_results: results,
        });
        let response = self.authorize(builder).send().await?;
        Self::ensure_status(response, |status| status == StatusCode::OK).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AgentError> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| AgentError::Health(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(AgentError::Health(format!("status {}", status.as_u16())))
        }
    }
}

/// Trim trailing slashes and a trailing `/api/v1`, which older configs included.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/api/v1")
        .unwrap_or(trimmed)
        .to_string()
}
