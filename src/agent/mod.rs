pub mod approval;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod mock;
pub mod session;
pub mod sse;
pub mod transport;

pub use approval::{GateError, ToolGate, ToolInvocation, ToolStatus, REJECTED_MESSAGE};
pub use client::HttpTransport;
pub use dispatcher::{StreamDispatcher, StreamHandle, StreamMessage, CHANNEL_CAPACITY};
pub use error::AgentError;
pub use events::*;
pub use session::{
    Effect, Message, Notice, Role, Session, SessionConfig, SessionState, TokenUsage,
    CANCELLED_MESSAGE,
};
pub use sse::{FrameReader, FrameStream, RawFrame};
pub use transport::{ByteStream, ChatRequest, ChatTransport};
