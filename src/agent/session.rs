//! Conversation state machine.
//!
//! [`Session`] is owned by the consumer loop and is the only place conversation state changes.
//! Its methods never perform I/O themselves; they return [`Effect`]s that the caller executes
//! (opening or cancelling a stream, running tools, posting tool results). The one exception is
//! [`Session::advance_tools`], which awaits the tool executor so that tool calls run inline with
//! the consumer and never overlap stream processing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::agent::approval::{GateError, ToolGate, ToolInvocation, ToolStatus};
use crate::agent::error::AgentError;
use crate::agent::events::{DomainEvent, ToolResult};
use crate::agent::transport::ChatRequest;
use crate::tools::ToolExecutor;

pub const CANCELLED_MESSAGE: &str = "Cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    WaitingApproval,
    Error,
}

impl SessionState {
    /// A stream is open or tools from an open stream are being handled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Streaming | SessionState::WaitingApproval
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::WaitingApproval => "waiting for approval",
            SessionState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            model: None,
            created_at: Utc::now(),
        }
    }

    fn assistant(content: String, model: &str) -> Self {
        Self {
            model: (!model.is_empty()).then(|| model.to_string()),
            ..Self::new(Role::Assistant, content)
        }
    }
}

/// Usage totals from the latest Complete event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Displayable information that does not change the session state
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Thinking(Option<String>),
    RagSearch(String),
    RagContext(Vec<String>),
    RateLimited {
        retry_after: u64,
        message: String,
    },
    CostWarning {
        message: String,
        current_cost: f64,
        cost_limit: Option<f64>,
    },
}

/// Side effects that should be executed outside the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a stream. Any previous stream has already been cancelled.
    OpenStream(ChatRequest),
    /// Cancel the active stream and drop anything it queued
    CancelStream,
    /// A terminal event arrived; stop reading and release the stream
    StopListening,
    /// Call [`Session::advance_tools`]
    RunTools,
    /// Post results for a conversation whose stream is still open
    ReportToolResults {
        conversation_id: String,
        results: Vec<ToolResult>,
    },
    /// Ask the user to approve the earliest pending call
    RequestApproval {
        id: String,
        name: String,
        preview: String,
    },
    Notice(Notice),
}

/// Per-run settings the session needs from configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub rag_enabled: bool,
}

pub struct Session {
    conversation_id: Option<String>,
    model: String,
    rag_enabled: bool,
    messages: Vec<Message>,
    streaming_buffer: String,
    tokens: TokenUsage,
    cost: f64,
    state: SessionState,
    tools: ToolGate,
    /// Results that could not be posted; sent with the next prompt
    deferred_results: Vec<ToolResult>,
    stream_open: bool,
}

impl Session {
    pub fn new(config: SessionConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            conversation_id: None,
            model: config.model,
            rag_enabled: config.rag_enabled,
            messages: Vec::new(),
            streaming_buffer: String::new(),
            tokens: TokenUsage::default(),
            cost: 0.0,
            state: SessionState::Idle,
            tools: ToolGate::new(executor),
            deferred_results: Vec::new(),
            stream_open: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn streaming_buffer(&self) -> &str {
        &self.streaming_buffer
    }

    pub fn tokens(&self) -> TokenUsage {
        self.tokens
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn pending_tools(&self) -> &[ToolInvocation] {
        self.tools.invocations()
    }

    pub fn pending_approval(&self) -> Option<&ToolInvocation> {
        self.tools.pending_approval()
    }

    pub fn deferred_results(&self) -> &[ToolResult] {
        &self.deferred_results
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = self.state.label(), to = state.label(), "Session state change");
            self.state = state;
        }
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Send a prompt. An active turn is cancelled first.
    pub fn submit_prompt(&mut self, text: &str, context: Option<Value>) -> Vec<Effect> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut effects = self.cancel();

        self.messages.push(Message::new(Role::User, text));
        self.streaming_buffer.clear();
        self.set_state(SessionState::Connecting);
        self.stream_open = true;

        let request = ChatRequest::new(text)
            .with_conversation(self.conversation_id.clone())
            .with_model(self.model.clone())
            .with_rag(self.rag_enabled)
            .with_context(context)
            .with_tool_results(std::mem::take(&mut self.deferred_results));

        tracing::info!(
            conversation_id = ?self.conversation_id,
            tool_results = request.tool_results.len(),
            "Submitting prompt"
        );
        effects.push(Effect::OpenStream(request));
        effects
    }

    /// Abandon the active turn. A no-op when nothing is active.
    pub fn cancel(&mut self) -> Vec<Effect> {
        if !self.state.is_active() {
            return Vec::new();
        }

        tracing::info!(state = self.state.label(), "Turn cancelled by user");
        self.tools.clear();
        self.streaming_buffer.clear();
        self.stream_open = false;
        self.messages.push(Message::new(Role::System, CANCELLED_MESSAGE));
        self.set_state(SessionState::Idle);
        vec![Effect::CancelStream]
    }

    /// Reset to an empty conversation from any state.
    pub fn new_conversation(&mut self) -> Vec<Effect> {
        let effects = if self.stream_open || self.state.is_active() {
            vec![Effect::CancelStream]
        } else {
            Vec::new()
        };

        tracing::info!("Starting new conversation");
        self.conversation_id = None;
        self.messages.clear();
        self.streaming_buffer.clear();
        self.tokens = TokenUsage::default();
        self.cost = 0.0;
        self.tools.clear();
        self.deferred_results.clear();
        self.stream_open = false;
        self.set_state(SessionState::Idle);
        effects
    }

    /// Leave the Error state.
    pub fn acknowledge_error(&mut self) {
        if self.state == SessionState::Error {
            self.set_state(SessionState::Idle);
        }
    }

    /// Approve or reject the call returned by [`pending_approval`](Self::pending_approval).
    pub fn resolve_approval(&mut self, approved: bool) -> Result<Vec<Effect>, GateError> {
        let id = self
            .tools
            .pending_approval()
            .map(|call| call.id.clone())
            .ok_or(GateError::NothingPending)?;

        if let Some(rejected) = self.tools.resolve(&id, approved)? {
            self.push_tool_message(&rejected);
        }
        // Later calls in the batch may now be runnable
        Ok(vec![Effect::RunTools])
    }

    // ------------------------------------------------------------------
    // Stream input
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: DomainEvent) -> Vec<Effect> {
        if !matches!(self.state, SessionState::Connecting | SessionState::Streaming) {
            tracing::debug!(
                event = event.event_type_name(),
                state = self.state.label(),
                "Ignoring event outside an active stream"
            );
            return Vec::new();
        }

        match event {
            DomainEvent::Started(started) => {
                if self.conversation_id.is_none() {
                    self.conversation_id = Some(started.conversation_id);
                } else if self.conversation_id.as_deref() != Some(started.conversation_id.as_str()) {
                    tracing::warn!(
                        existing = ?self.conversation_id,
                        received = %started.conversation_id,
                        "Server reported a different conversation id; keeping the first"
                    );
                }
                if !started.model.is_empty() {
                    self.model = started.model;
                }
                self.set_state(SessionState::Streaming);
                Vec::new()
            }
            DomainEvent::Thinking(thinking) => {
                vec![Effect::Notice(Notice::Thinking(thinking.message))]
            }
            DomainEvent::Text(text) => {
                self.streaming_buffer.push_str(&text.content);
                self.set_state(SessionState::Streaming);
                Vec::new()
            }
            DomainEvent::ToolRequests(requests) => {
                if requests.tools.is_empty() {
                    return Vec::new();
                }
                self.flush_buffer();
                if self.tools.submit(requests.tools) {
                    self.set_state(SessionState::WaitingApproval);
                } else {
                    self.set_state(SessionState::Streaming);
                }
                vec![Effect::RunTools]
            }
            DomainEvent::RagSearch(search) => {
                vec![Effect::Notice(Notice::RagSearch(search.query))]
            }
            DomainEvent::RagContext(context) => {
                let files = context.chunks.into_iter().map(|chunk| chunk.file).collect();
                vec![Effect::Notice(Notice::RagContext(files))]
            }
            DomainEvent::RateLimited(limited) => vec![Effect::Notice(Notice::RateLimited {
                retry_after: limited.retry_after,
                message: limited.message,
            })],
            DomainEvent::CostWarning(warning) => vec![Effect::Notice(Notice::CostWarning {
                message: warning.message,
                current_cost: warning.current_cost,
                cost_limit: warning.cost_limit,
            })],
            DomainEvent::Complete(complete) => {
                self.flush_buffer();
                self.tokens = TokenUsage {
                    input: complete.input_tokens,
                    output: complete.output_tokens,
                    total: complete.total_tokens,
                };
                self.cost = complete.total_cost;
                self.stream_open = false;
                self.set_state(SessionState::Idle);
                tracing::info!(
                    total_tokens = complete.total_tokens,
                    cost = complete.total_cost,
                    "Turn complete"
                );
                vec![Effect::StopListening]
            }
            DomainEvent::Error(error) => self.fail(error.display_message()),
        }
    }

    /// Transport or decode failure on the active stream, or a failed tool-result post.
    pub fn handle_failure(&mut self, error: &AgentError) -> Vec<Effect> {
        if !self.state.is_active() && !self.stream_open {
            tracing::debug!(error = %error, "Ignoring failure from an inactive stream");
            return Vec::new();
        }
        self.fail(error.to_string())
    }

    /// The stream ended without a Complete or Error event.
    pub fn stream_closed(&mut self) -> Vec<Effect> {
        self.stream_open = false;
        if matches!(self.state, SessionState::Connecting | SessionState::Streaming) {
            tracing::debug!("Stream closed without a terminal event");
            self.flush_buffer();
            self.set_state(SessionState::Idle);
        }
        Vec::new()
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    /// Run every call in the batch that is not blocked on approval, then report or wait.
    pub async fn advance_tools(&mut self) -> Vec<Effect> {
        while let Some(finished) = self.tools.run_next().await {
            self.push_tool_message(&finished);
        }
        self.after_tool_step()
    }

    fn after_tool_step(&mut self) -> Vec<Effect> {
        if let Some(call) = self.tools.pending_approval() {
            let effect = Effect::RequestApproval {
                id: call.id.clone(),
                name: call.name.clone(),
                preview: self.tools.executor().approval_preview(&call.name, &call.args),
            };
            self.set_state(SessionState::WaitingApproval);
            return vec![effect];
        }

        if self.tools.is_empty() || !self.tools.is_resolved() {
            return Vec::new();
        }

        let results = self.tools.take_results();
        match (self.conversation_id.clone(), self.stream_open) {
            (Some(conversation_id), true) => {
                self.set_state(SessionState::Streaming);
                vec![Effect::ReportToolResults {
                    conversation_id,
                    results,
                }]
            }
            _ => {
                tracing::debug!(count = results.len(), "Deferring tool results to the next prompt");
                self.deferred_results.extend(results);
                let next = if self.stream_open {
                    SessionState::Streaming
                } else {
                    SessionState::Idle
                };
                self.set_state(next);
                Vec::new()
            }
        }
    }

    fn push_tool_message(&mut self, call: &ToolInvocation) {
        let content = match (call.status, &call.error) {
            (ToolStatus::Error, Some(error)) => format!("{}: {error}", call.name),
            _ => format!("{}: ok", call.name),
        };
        self.messages.push(Message::new(Role::Tool, content));
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn flush_buffer(&mut self) {
        if self.streaming_buffer.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.streaming_buffer);
        self.messages.push(Message::assistant(content, &self.model));
    }

    fn fail(&mut self, message: String) -> Vec<Effect> {
        tracing::warn!(error = %message, state = self.state.label(), "Stream failed");
        self.messages.push(Message::new(Role::Error, message));
        self.streaming_buffer.clear();
        self.tools.clear();
        self.stream_open = false;
        self.set_state(SessionState::Error);
        vec![Effect::CancelStream]
    }
}
