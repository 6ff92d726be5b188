//! Shared test utilities for gula-ai
//!
//! - A recording tool executor with the production approval rules
//! - An [`App`] harness wired to a [`MockTransport`]

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gula::agent::mock::MockTransport;
use gula::agent::SessionState;
use gula::tools::{ToolArgs, ToolError, ToolExecutor, ToolKind};
use gula::ui::UiEvent;
use gula::{App, Config};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor that records calls instead of touching the filesystem
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    fails: Option<String>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Like [`RecordingExecutor::new`], but calls to `name` return a git error.
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            fails: Some(name.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, _args: &ToolArgs) -> Result<String, ToolError> {
        self.calls.lock().push(name.to_string());
        if self.fails.as_deref() == Some(name) {
            return Err(ToolError::Git("not a git repository".into()));
        }
        Ok(format!("{name} done"))
    }

    fn needs_approval(&self, name: &str) -> bool {
        ToolKind::from_name(name).map_or(true, ToolKind::needs_approval)
    }
}

pub struct Harness {
    pub app: App,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub transport: Arc<MockTransport>,
    pub executor: Arc<RecordingExecutor>,
}

impl Harness {
    pub fn new(transport: MockTransport) -> Self {
        Self::with_executor(transport, RecordingExecutor::new())
    }

    pub fn with_executor(transport: MockTransport, executor: Arc<RecordingExecutor>) -> Self {
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let transport = Arc::new(transport);
        let config = Config::default().with_model("gpt");
        let app = App::new(&config, transport.clone(), executor.clone(), ui_tx).without_context();

        Self {
            app,
            ui,
            transport,
            executor,
        }
    }

    /// Process stream messages until the stream ends or a call needs approval.
    pub async fn drain(&mut self) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while self.app.has_stream() && self.app.session().state() != SessionState::WaitingApproval {
            let message = tokio::time::timeout_at(deadline, self.app.next_stream_message())
                .await
                .expect("stream did not finish in time");
            self.app.handle_stream_message(message).await;
        }
    }

    pub fn ui_events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }
}
