pub mod agent;
pub mod config;
pub mod context;
pub mod tools;
pub mod ui;
pub mod util;

pub use agent::{
    AgentError, ChatRequest, ChatTransport, DomainEvent, Effect, HttpTransport, Session,
    SessionState, StreamDispatcher, StreamHandle, ToolGate,
};
pub use config::Config;
pub use tools::{ToolExecutor, ToolKind, ToolRegistry};
pub use ui::App;
