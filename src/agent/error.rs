use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the streaming engine. Each one is fatal to the stream that produced it.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Network failure before or while reading the response body.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API error (status {status}): {body}")]
    Status { status: StatusCode, body: String },

    /// A known event type carried a payload that does not match its schema.
    #[error("failed to parse {event} event: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// The byte stream failed mid-read (used by non-HTTP transports).
    #[error("stream error: {0}")]
    Stream(String),

    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("health check failed: {0}")]
    Health(String),
}

impl AgentError {
    /// HTTP status for transport errors that carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AgentError::Status { status, .. } => Some(*status),
            AgentError::Request(err) => err.status(),
            _ => None,
        }
    }
}
