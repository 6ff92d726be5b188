use thiserror::Error;

/// Something the user asked for at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Prompt(String),
    Cancel,
    Approve,
    Reject,
    /// Dismiss the error state
    Acknowledge,
    NewConversation,
    Health,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),
}

pub const HELP_TEXT: &str = "\
Commands:
  /new       start a new conversation
  /cancel    cancel the current response
  /approve   approve the pending tool call (also /y)
  /reject    reject the pending tool call (also /n)
  /ack       dismiss an error
  /health    check the agent service
  /help      show this help
  /quit      exit (also /exit)
Anything else is sent as a prompt.";

impl UserAction {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(UserAction::Prompt(line.to_string())));
        };

        let name = command.split_whitespace().next().unwrap_or_default();
        let action = match name.to_ascii_lowercase().as_str() {
            "new" | "clear" => UserAction::NewConversation,
            "cancel" | "stop" => UserAction::Cancel,
            "approve" | "y" | "yes" => UserAction::Approve,
            "reject" | "n" | "no" => UserAction::Reject,
            "ack" => UserAction::Acknowledge,
            "health" => UserAction::Health,
            "help" | "?" => UserAction::Help,
            "quit" | "exit" | "q" => UserAction::Quit,
            _ => return Err(ParseError::UnknownCommand(name.to_string())),
        };
        Ok(Some(action))
    }
}
