//! Mock chat transport for deterministic testing
//!
//! Implements [`ChatTransport`] by replaying scripted SSE text instead of talking to a server.
//! Requests and tool-result posts are captured for assertions, and the transport records when
//! a byte stream it handed out has been dropped so tests can prove the connection was released.
//!
//! # Example
//! ```no_run
//! use gula::agent::mock::{MockConfig, MockSseBuilder, MockTransport};
//!
//! let chunks = MockSseBuilder::new()
//!     .started("c1", "gpt")
//!     .text("Hi")
//!     .complete(10, 0.01)
//!     .build();
//! let transport = MockTransport::new(MockConfig::default().with_chunks(chunks));
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::agent::error::AgentError;
use crate::agent::events::ToolResult;
use crate::agent::transport::{ByteStream, ChatRequest, ChatTransport};

/// Failure to simulate for one response
#[derive(Clone, Debug)]
pub enum MockFailure {
    /// Non-success status when opening the stream
    Status(u16, String),
    /// Read error after all scripted chunks were delivered
    MidStream(String),
}

/// Scripted response for one `open_stream` call
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Raw body chunks, delivered one per read
    pub chunks: Vec<String>,
    /// Delay before each chunk
    pub chunk_delay: Duration,
    /// Keep the connection open after the last chunk instead of closing it
    pub hold_open: bool,
    pub failure: Option<MockFailure>,
}

impl MockConfig {
    pub fn with_chunks(mut self, chunks: Vec<String>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Fail the request with the given status before any body is read
    pub fn failing_with_status(mut self, status: u16, body: impl Into<String>) -> Self {
        self.failure = Some(MockFailure::Status(status, body.into()));
        self
    }

    pub fn failing_mid_stream(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(MockFailure::MidStream(message.into()));
        self
    }
}

/// Mock transport for testing
pub struct MockTransport {
    /// Responses for successive `open_stream` calls; the last one repeats
    responses: Mutex<VecDeque<MockConfig>>,
    captured_requests: Arc<Mutex<Vec<ChatRequest>>>,
    captured_tool_results: Arc<Mutex<Vec<(String, Vec<ToolResult>)>>>,
    /// Set when the most recent byte stream was dropped
    released: Arc<Mutex<bool>>,
    fail_tool_results: bool,
    healthy: bool,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([config])),
            captured_requests: Arc::new(Mutex::new(Vec::new())),
            captured_tool_results: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(Mutex::new(false)),
            fail_tool_results: false,
            healthy: true,
        }
    }

    /// Queue the response for the next `open_stream` call
    pub fn then(self, config: MockConfig) -> Self {
        self.responses.lock().push_back(config);
        self
    }

    pub fn failing_tool_results(mut self) -> Self {
        self.fail_tool_results = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn captured_requests(&self) -> Vec<ChatRequest> {
        self.captured_requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.captured_requests.lock().last().cloned()
    }

    /// Tool-result posts as `(conversation_id, results)`
    pub fn captured_tool_results(&self) -> Vec<(String, Vec<ToolResult>)> {
        self.captured_tool_results.lock().clone()
    }

    /// Whether the last byte stream handed out has been dropped
    pub fn was_released(&self) -> bool {
        *self.released.lock()
    }

    fn next_response(&self) -> MockConfig {
        let mut responses = self.responses.lock();
        if responses.len() > 1 {
            responses.pop_front().unwrap_or_default()
        } else {
            responses.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, AgentError> {
        self.captured_requests.lock().push(request.clone());
        let config = self.next_response();

        if let Some(MockFailure::Status(code, body)) = &config.failure {
            return Err(AgentError::Status {
                status: StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body: body.clone(),
            });
        }

        *self.released.lock() = false;

        let delay = config.chunk_delay;
        let chunks = futures::stream::iter(config.chunks).then(move |chunk| async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, AgentError>(Bytes::from(chunk))
        });

        let tail: ByteStream = match (config.failure, config.hold_open) {
            (Some(MockFailure::MidStream(message)), _) => {
                Box::pin(futures::stream::once(async move {
                    Err(AgentError::Stream(message))
                }))
            }
            (_, true) => Box::pin(futures::stream::pending()),
            _ => Box::pin(futures::stream::empty()),
        };

        Ok(Box::pin(TrackedStream {
            inner: Box::pin(chunks.chain(tail)),
            released: Arc::clone(&self.released),
        }))
    }

    async fn send_tool_results(
        &self,
        conversation_id: &str,
        results: &[ToolResult],
    ) -> Result<(), AgentError> {
        self.captured_tool_results
            .lock()
            .push((conversation_id.to_string(), results.to_vec()));

        if self.fail_tool_results {
            return Err(AgentError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: "tool results rejected".into(),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AgentError> {
        if self.healthy {
            Ok(())
        } else {
            Err(AgentError::Health("status 503".into()))
        }
    }
}

/// Byte stream that flags the transport as released when dropped
struct TrackedStream {
    inner: ByteStream,
    released: Arc<Mutex<bool>>,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        *self.released.lock() = true;
    }
}

/// Builder for scripted SSE bodies
///
/// Each call appends one complete frame as its own chunk.
#[derive(Default)]
pub struct MockSseBuilder {
    chunks: Vec<String>,
}

impl MockSseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame with an arbitrary event type and payload
    pub fn event(mut self, event_type: &str, data: Value) -> Self {
        self.chunks
            .push(format!("event: {event_type}\ndata: {data}\n\n"));
        self
    }

    /// Append raw text, e.g. comments or deliberately broken frames
    pub fn raw(mut self, text: &str) -> Self {
        self.chunks.push(text.to_string());
        self
    }

    pub fn started(self, conversation_id: &str, model: &str) -> Self {
        self.event(
            "started",
            json!({
                "conversation_id": conversation_id,
                "model": model,
                "timestamp": "2025-01-01T00:00:00Z",
            }),
        )
    }

    pub fn thinking(self, message: &str) -> Self {
        self.event("thinking", json!({ "message": message }))
    }

    pub fn text(self, content: &str) -> Self {
        self.event("text", json!({ "content": content }))
    }

    /// Append a tool request batch of `(id, name, args)` entries
    pub fn tool_requests(self, tools: &[(&str, &str, Value)]) -> Self {
        let tools: Vec<Value> = tools
            .iter()
            .map(|(id, name, args)| json!({ "id": id, "name": name, "args": args }))
            .collect();
        self.event("tool_requests", json!({ "tools": tools }))
    }

    pub fn rate_limited(self, retry_after: u64, message: &str) -> Self {
        self.event(
            "rate_limited",
            json!({ "retry_after": retry_after, "message": message }),
        )
    }

    pub fn cost_warning(self, message: &str, current_cost: f64) -> Self {
        self.event(
            "cost_warning",
            json!({ "message": message, "current_cost": current_cost }),
        )
    }

    pub fn complete(self, total_tokens: u64, total_cost: f64) -> Self {
        self.event(
            "complete",
            json!({
                "total_tokens": total_tokens,
                "input_tokens": 0,
                "output_tokens": 0,
                "total_cost": total_cost,
            }),
        )
    }

    pub fn error(self, error: &str, code: Option<&str>) -> Self {
        self.event("error", json!({ "error": error, "code": code }))
    }

    pub fn build(self) -> Vec<String> {
        self.chunks
    }
}
