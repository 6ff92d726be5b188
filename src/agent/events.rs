use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::agent::error::AgentError;
use crate::agent::sse::RawFrame;

/// Typed event decoded from one SSE frame of the chat stream
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Conversation opened on the server
    Started(StartedEvent),

    /// Agent is reasoning before producing output
    Thinking(ThinkingEvent),

    /// Incremental assistant text
    Text(TextEvent),

    /// Agent asks the client to run local tools
    ToolRequests(ToolRequestsEvent),

    /// Server-side retrieval began
    RagSearch(RagSearchEvent),

    /// Server-side retrieval results
    RagContext(RagContextEvent),

    /// Turn finished, with usage totals
    Complete(CompleteEvent),

    /// Server reported a failure
    Error(ErrorEvent),

    /// Advisory: requests are being throttled
    RateLimited(RateLimitedEvent),

    /// Advisory: spend is approaching a limit
    CostWarning(CostWarningEvent),
}

impl DomainEvent {
    /// Wire name of the event type
    pub fn event_type_name(&self) -> &'static str {
        match self {
            DomainEvent::Started(_) => "started",
            DomainEvent::Thinking(_) => "thinking",
            DomainEvent::Text(_) => "text",
            DomainEvent::ToolRequests(_) => "tool_requests",
            DomainEvent::RagSearch(_) => "rag_search",
            DomainEvent::RagContext(_) => "rag_context",
            DomainEvent::Complete(_) => "complete",
            DomainEvent::Error(_) => "error",
            DomainEvent::RateLimited(_) => "rate_limited",
            DomainEvent::CostWarning(_) => "cost_warning",
        }
    }

    /// Complete and Error end the turn; nothing after them is read.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DomainEvent::Complete(_) | DomainEvent::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub conversation_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvent {
    pub content: String,
}

/// One tool execution requested by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequestsEvent {
    pub tools: Vec<ToolRequest>,
}

/// Outcome of one tool invocation, reported back to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSearchEvent {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagChunk {
    pub file: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagContextEvent {
    #[serde(default)]
    pub chunks: Vec<RagChunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEvent {
    /// Message shown to the user, with the code prefixed when present.
    pub fn display_message(&self) -> String {
        match self.code.as_deref() {
            Some(code) if !code.is_empty() => format!("[{code}] {}", self.error),
            _ => self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitedEvent {
    /// Seconds until the server accepts requests again
    #[serde(default)]
    pub retry_after: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWarningEvent {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub current_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_limit: Option<f64>,
}

type PayloadParser = fn(&str) -> Result<DomainEvent, serde_json::Error>;

fn parse<T: DeserializeOwned>(data: &str) -> Result<T, serde_json::Error> {
    // A frame with no data lines still has to satisfy the schema of its event type.
    let data = if data.trim().is_empty() { "{}" } else { data };
    serde_json::from_str(data)
}

/// Parser registered for an event type, if any.
fn parser_for(event_type: &str) -> Option<PayloadParser> {
    let parser: PayloadParser = match event_type {
        "started" => |data| parse(data).map(DomainEvent::Started),
        "thinking" => |data| parse(data).map(DomainEvent::Thinking),
        "text" => |data| parse(data).map(DomainEvent::Text),
        "tool_requests" => |data| parse(data).map(DomainEvent::ToolRequests),
        "rag_search" => |data| parse(data).map(DomainEvent::RagSearch),
        "rag_context" => |data| parse(data).map(DomainEvent::RagContext),
        "complete" => |data| parse(data).map(DomainEvent::Complete),
        "error" => |data| parse(data).map(DomainEvent::Error),
        "rate_limited" => |data| parse(data).map(DomainEvent::RateLimited),
        "cost_warning" => |data| parse(data).map(DomainEvent::CostWarning),
        _ => return None,
    };
    Some(parser)
}

/// Decode one frame.
///
/// Returns `Ok(None)` for event types without a registered parser so newer servers can add
/// events without breaking older clients. A malformed payload for a known type is an error
/// that must end the stream.
pub fn decode(frame: &RawFrame) -> Result<Option<DomainEvent>, AgentError> {
    let Some(parser) = parser_for(&frame.event_type) else {
        tracing::trace!(event = %frame.event_type, "Ignoring unknown SSE event type");
        return Ok(None);
    };

    parser(&frame.data())
        .map(Some)
        .map_err(|source| AgentError::Decode {
            event: frame.event_type.clone(),
            source,
        })
}

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
