//! Consumer loop.
//!
//! [`App`] owns the [`Session`] and the active [`StreamHandle`]. It multiplexes user actions with
//! stream messages, feeds both into the session and executes the resulting [`Effect`]s. While a
//! tool call waits for approval the stream is not read, so the producer blocks on the bounded
//! channel until the user decides.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::{
    ChatTransport, Effect, Role, Session, SessionConfig, SessionState, StreamDispatcher,
    StreamHandle, StreamMessage, TokenUsage,
};
use crate::config::Config;
use crate::context;
use crate::tools::ToolExecutor;
use crate::ui::action::{UserAction, HELP_TEXT};
use crate::ui::events::UiEvent;

/// What the front-end has already been shown
#[derive(Debug, Default)]
struct ViewCursor {
    messages: usize,
    streamed: usize,
    state: SessionState,
    tokens: TokenUsage,
}

pub struct App {
    session: Session,
    dispatcher: StreamDispatcher,
    stream: Option<StreamHandle>,
    working_dir: PathBuf,
    send_context: bool,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    view: ViewCursor,
}

impl App {
    pub fn new(
        config: &Config,
        transport: Arc<dyn ChatTransport>,
        executor: Arc<dyn ToolExecutor>,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let session = Session::new(
            SessionConfig {
                model: config.default_model.clone(),
                rag_enabled: config.rag_enabled,
            },
            executor,
        );

        Self {
            session,
            dispatcher: StreamDispatcher::new(transport),
            stream: None,
            working_dir: config.working_dir.clone(),
            send_context: true,
            ui_tx,
            view: ViewCursor::default(),
        }
    }

    /// Skip attaching project context to prompts
    pub fn without_context(mut self) -> Self {
        self.send_context = false;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Run until `/quit` or until the action channel closes.
    pub async fn run(&mut self, mut actions: mpsc::UnboundedReceiver<UserAction>) {
        tracing::info!(working_dir = %self.working_dir.display(), "Consumer loop started");

        loop {
            let reading =
                self.stream.is_some() && self.session.state() != SessionState::WaitingApproval;

            tokio::select! {
                action = actions.recv() => match action {
                    None | Some(UserAction::Quit) => break,
                    Some(action) => self.handle_action(action).await,
                },
                message = next_message(&mut self.stream), if reading => {
                    self.handle_stream_message(message).await;
                }
            }
        }

        if let Some(mut stream) = self.stream.take() {
            stream.cancel();
        }
        tracing::info!("Consumer loop stopped");
    }

    pub async fn handle_action(&mut self, action: UserAction) {
        tracing::debug!(?action, state = self.session.state().label(), "User action");

        let effects = match action {
            UserAction::Prompt(text) => {
                let context = if self.send_context {
                    self.gather_context().await
                } else {
                    None
                };
                self.session.submit_prompt(&text, context)
            }
            UserAction::Cancel => self.session.cancel(),
            UserAction::Approve => self.resolve_approval(true),
            UserAction::Reject => self.resolve_approval(false),
            UserAction::Acknowledge => {
                self.session.acknowledge_error();
                Vec::new()
            }
            UserAction::NewConversation => self.session.new_conversation(),
            UserAction::Health => {
                let event = match self.dispatcher.transport().health_check().await {
                    Ok(()) => UiEvent::Info("Agent service is healthy".to_string()),
                    Err(e) => UiEvent::Error(e.to_string()),
                };
                self.emit(event);
                Vec::new()
            }
            UserAction::Help => {
                self.emit(UiEvent::Info(HELP_TEXT.to_string()));
                Vec::new()
            }
            UserAction::Quit => Vec::new(),
        };

        self.apply(effects).await;
    }

    /// Walks the working directory on the blocking pool.
    async fn gather_context(&self) -> Option<serde_json::Value> {
        let dir = self.working_dir.clone();
        match tokio::task::spawn_blocking(move || context::project_context(&dir)).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Project context task failed");
                None
            }
        }
    }

    fn resolve_approval(&mut self, approved: bool) -> Vec<Effect> {
        match self.session.resolve_approval(approved) {
            Ok(effects) => effects,
            Err(e) => {
                self.emit(UiEvent::Error(e.to_string()));
                Vec::new()
            }
        }
    }

    /// Feed one stream message (or the end of the stream) into the session.
    pub async fn handle_stream_message(&mut self, message: Option<StreamMessage>) {
        let effects = match message {
            Some(StreamMessage::Event(event)) => self.session.handle_event(event),
            Some(StreamMessage::Failed(err)) => self.session.handle_failure(&err),
            None => {
                let cancelled = self
                    .stream
                    .take()
                    .map(|stream| stream.is_cancelled())
                    .unwrap_or(true);
                if cancelled {
                    Vec::new()
                } else {
                    self.session.stream_closed()
                }
            }
        };
        self.apply(effects).await;
    }

    /// Wait for the next message of the active stream. Pending forever without one.
    pub async fn next_stream_message(&mut self) -> Option<StreamMessage> {
        next_message(&mut self.stream).await
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenStream(request) => {
                    if let Some(mut old) = self.stream.take() {
                        old.cancel();
                    }
                    self.stream = Some(self.dispatcher.start(request));
                }
                Effect::CancelStream => {
                    if let Some(mut stream) = self.stream.take() {
                        stream.cancel();
                    }
                }
                Effect::StopListening => {
                    if let Some(mut stream) = self.stream.take() {
                        stream.finish();
                    }
                }
                Effect::RunTools => {
                    queue.extend(self.session.advance_tools().await);
                }
                Effect::ReportToolResults {
                    conversation_id,
                    results,
                } => {
                    tracing::debug!(%conversation_id, count = results.len(), "Reporting tool results");
                    if let Err(err) = self
                        .dispatcher
                        .transport()
                        .send_tool_results(&conversation_id, &results)
                        .await
                    {
                        tracing::warn!(error = %err, "Failed to report tool results");
                        queue.extend(self.session.handle_failure(&err));
                    }
                }
                Effect::RequestApproval { id, name, preview } => {
                    self.sync_view();
                    self.emit(UiEvent::ApprovalRequested { id, name, preview });
                }
                Effect::Notice(notice) => {
                    self.sync_view();
                    self.emit(UiEvent::Notice(notice));
                }
            }
        }

        self.sync_view();
    }

    /// Emit whatever changed in the session since the last call.
    fn sync_view(&mut self) {
        let messages = self.session.messages();
        let mut events = Vec::new();

        if messages.len() < self.view.messages {
            if self.view.streamed > 0 {
                events.push(UiEvent::StreamEnd);
            }
            events.push(UiEvent::Cleared);
            self.view.messages = 0;
            self.view.streamed = 0;
        }

        for message in &messages[self.view.messages..] {
            if self.view.streamed > 0 {
                events.push(UiEvent::StreamEnd);
                self.view.streamed = 0;
                // Already shown as it streamed
                if message.role == Role::Assistant {
                    continue;
                }
            }
            events.push(UiEvent::Message(message.clone()));
        }
        self.view.messages = messages.len();

        let buffer = self.session.streaming_buffer();
        if buffer.len() < self.view.streamed {
            events.push(UiEvent::StreamEnd);
            self.view.streamed = 0;
        }
        if let Some(delta) = buffer.get(self.view.streamed..).filter(|d| !d.is_empty()) {
            events.push(UiEvent::StreamText(delta.to_string()));
            self.view.streamed = buffer.len();
        }

        let state = self.session.state();
        if state != self.view.state {
            self.view.state = state;
            events.push(UiEvent::StateChanged(state));
        }

        let tokens = self.session.tokens();
        if tokens != self.view.tokens {
            self.view.tokens = tokens;
            if tokens.total > 0 {
                events.push(UiEvent::Usage {
                    tokens,
                    cost: self.session.cost(),
                });
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: UiEvent) {
        if self.ui_tx.send(event).is_err() {
            tracing::trace!("UI event dropped; front-end is gone");
        }
    }
}

async fn next_message(stream: &mut Option<StreamHandle>) -> Option<StreamMessage> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
