use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::agent::error::AgentError;
use crate::agent::events::ToolResult;

/// Body chunks of an open chat stream. Dropping it releases the connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AgentError>> + Send>>;

/// Body of `POST /api/v1/agent/chat/hybrid`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_rag: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
        self
    }

    pub fn with_context(mut self, context: Option<Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn with_tool_results(mut self, results: Vec<ToolResult>) -> Self {
        self.tool_results = results;
        self
    }
}

/// Body of `POST /api/v1/agent/chat/tool-results`
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultsRequest<'a> {
    pub conversation_id: &'a str,
    pub tool_results: &'a [ToolResult],
}

/// Connection to the agent service.
///
/// The HTTP implementation lives in [`crate::agent::client`]; tests use
/// [`crate::agent::mock::MockTransport`].
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streaming chat request. Non-success statuses are returned as
    /// [`AgentError::Status`] before any body is read.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, AgentError>;

    /// Report tool results for a conversation whose stream is still open.
    async fn send_tool_results(
        &self,
        conversation_id: &str,
        results: &[ToolResult],
    ) -> Result<(), AgentError>;

    /// Check that the service is reachable.
    async fn health_check(&self) -> Result<(), AgentError>;
}
