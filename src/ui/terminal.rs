//! Line-mode front-end: stdin lines in, styled text out.

use std::io::{self, BufRead, Write};
use std::thread;

use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::{queue, QueueableCommand};
use tokio::sync::mpsc;

use crate::agent::{Message, Notice, Role, SessionState};
use crate::ui::action::UserAction;
use crate::ui::events::UiEvent;

/// Read stdin on a dedicated thread so a blocked read never holds up runtime shutdown.
///
/// End of input is reported as [`UserAction::Quit`].
pub fn spawn_input_reader(
    actions: mpsc::UnboundedSender<UserAction>,
    ui: mpsc::UnboundedSender<UiEvent>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("gula-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                match UserAction::parse(&line) {
                    Ok(Some(action)) => {
                        let quit = action == UserAction::Quit;
                        if actions.send(action).is_err() || quit {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = ui.send(UiEvent::Error(e.to_string()));
                    }
                }
            }
            let _ = actions.send(UserAction::Quit);
        })
}

/// Render UI events until the controller drops its sender.
pub async fn render_events<W: Write>(mut events: mpsc::UnboundedReceiver<UiEvent>, out: W) {
    let mut renderer = Renderer::new(out);
    while let Some(event) = events.recv().await {
        if let Err(e) = renderer.render(&event) {
            tracing::warn!(error = %e, "Failed to write to terminal");
            break;
        }
    }
}

pub struct Renderer<W: Write> {
    out: W,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &UiEvent) -> io::Result<()> {
        match event {
            UiEvent::Message(message) => self.message(message)?,
            UiEvent::StreamText(text) => {
                self.out.queue(Print(text))?;
            }
            UiEvent::StreamEnd => {
                self.out.queue(Print("\n"))?;
            }
            UiEvent::Cleared => self.line(Color::DarkGrey, "--- new conversation ---")?,
            UiEvent::StateChanged(state) => self.state(*state)?,
            UiEvent::Usage { tokens, cost } => self.line(
                Color::DarkGrey,
                &format!("[{} tokens, ${cost:.4}]", tokens.total),
            )?,
            UiEvent::Notice(notice) => self.notice(notice)?,
            UiEvent::ApprovalRequested { name, preview, .. } => {
                self.line(Color::Yellow, &format!("Tool {name} needs approval:"))?;
                for line in preview.lines() {
                    self.line(Color::Reset, &format!("  {line}"))?;
                }
                self.line(Color::Yellow, "/approve or /reject")?;
            }
            UiEvent::Info(text) => self.line(Color::Reset, text)?,
            UiEvent::Error(text) => self.line(Color::Red, text)?,
        }
        self.out.flush()
    }

    fn message(&mut self, message: &Message) -> io::Result<()> {
        match message.role {
            Role::User => self.line(Color::Cyan, &format!("> {}", message.content)),
            Role::Assistant => self.line(Color::Reset, &message.content),
            Role::System => self.line(Color::Yellow, &message.content),
            Role::Error => self.line(Color::Red, &format!("Error: {}", message.content)),
            Role::Tool => self.line(Color::Magenta, &format!("  [tool] {}", message.content)),
        }
    }

    fn state(&mut self, state: SessionState) -> io::Result<()> {
        match state {
            SessionState::Connecting => self.line(Color::DarkGrey, "..."),
            SessionState::Error => self.line(Color::DarkGrey, "(/ack to dismiss, or send a new prompt)"),
            _ => Ok(()),
        }
    }

    fn notice(&mut self, notice: &Notice) -> io::Result<()> {
        let text = match notice {
            Notice::Thinking(Some(message)) => format!("thinking: {message}"),
            Notice::Thinking(None) => "thinking...".to_string(),
            Notice::RagSearch(query) => format!("searching codebase: {query}"),
            Notice::RagContext(files) => format!("using context from {} file(s)", files.len()),
            Notice::RateLimited {
                retry_after,
                message,
            } => format!("rate limited (retry in {retry_after}s): {message}"),
            Notice::CostWarning {
                message,
                current_cost,
                cost_limit,
            } => match cost_limit {
                Some(limit) => format!("{message} (${current_cost:.2} of ${limit:.2})"),
                None => format!("{message} (${current_cost:.2})"),
            },
        };
        let color = match notice {
            Notice::RateLimited { .. } | Notice::CostWarning { .. } => Color::Yellow,
            _ => Color::DarkGrey,
        };
        self.line(color, &text)
    }

    fn line(&mut self, color: Color, text: &str) -> io::Result<()> {
        if color == Color::Reset {
            return queue!(self.out, Print(text), Print("\n"));
        }
        queue!(
            self.out,
            SetForegroundColor(color),
            Print(text),
            ResetColor,
            SetAttribute(Attribute::Reset),
            Print("\n")
        )
    }
}
