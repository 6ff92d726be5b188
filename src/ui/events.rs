use crate::agent::{Message, Notice, SessionState, TokenUsage};

/// Output of the controller, rendered by the front-end
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A message was appended to the conversation
    Message(Message),

    /// More assistant text arrived
    StreamText(String),

    /// The text shown through [`UiEvent::StreamText`] ended
    StreamEnd,

    /// The conversation was reset
    Cleared,

    StateChanged(SessionState),

    Usage { tokens: TokenUsage, cost: f64 },

    Notice(Notice),

    /// A tool call is waiting for `/approve` or `/reject`
    ApprovalRequested {
        id: String,
        name: String,
        preview: String,
    },

    /// Informational output that is not part of the conversation
    Info(String),

    /// Error that is not part of the conversation (bad command, failed health check)
    Error(String),
}
