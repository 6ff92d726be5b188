//! Local tools the agent can ask the client to run.
//!
//! The tool set is fixed: [`ToolKind`] enumerates it and [`ToolRegistry`] dispatches a call to
//! the matching implementation. The session engine only sees the [`ToolExecutor`] trait.

mod command;
mod fs;
mod git;
mod search;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Arguments of one tool call, as sent by the agent.
pub type ToolArgs = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("{name} must be {expected}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
    },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{what} not found: {}", .path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("path is a directory, not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("file too large (>1MB): {}", .0.display())]
    TooLarge(PathBuf),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    #[error("git error: {0}")]
    Git(String),

    #[error("unknown action: {0} (valid: status, log, diff, branch)")]
    UnknownAction(String),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("tool task failed: {0}")]
    Task(String),
}

impl ToolError {
    fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> ToolError {
        move |source| ToolError::Io { context, source }
    }
}

/// Capability the approval gate needs from a tool backend.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a tool to completion and return its textual output.
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError>;

    /// Whether the user must approve the call before it runs.
    fn needs_approval(&self, name: &str) -> bool;

    /// Text shown to the user when asking to approve a call.
    fn approval_preview(&self, name: &str, args: &ToolArgs) -> String {
        approval_preview(name, args, Path::new("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    ListFiles,
    SearchCode,
    RunCommand,
    GitInfo,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::ListFiles,
        ToolKind::SearchCode,
        ToolKind::RunCommand,
        ToolKind::GitInfo,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::ListFiles => "list_files",
            ToolKind::SearchCode => "search_code",
            ToolKind::RunCommand => "run_command",
            ToolKind::GitInfo => "git_info",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "Read the contents of a file",
            ToolKind::WriteFile => "Write content to a file (creates or overwrites)",
            ToolKind::ListFiles => "List files in a directory with optional pattern matching",
            ToolKind::SearchCode => "Search for patterns in code files using regex",
            ToolKind::RunCommand => "Execute a shell command",
            ToolKind::GitInfo => "Get git repository information (status, log, diff, branch)",
        }
    }

    /// Tools with side effects beyond inspection.
    pub fn needs_approval(self) -> bool {
        matches!(self, ToolKind::WriteFile | ToolKind::RunCommand)
    }
}

/// Table of available tools bound to a working directory.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    working_dir: PathBuf,
    tools: Vec<ToolKind>,
}

impl ToolRegistry {
    /// Registry with every tool enabled.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self::with_tools(working_dir, ToolKind::ALL.to_vec())
    }

    pub fn with_tools(working_dir: impl Into<PathBuf>, tools: Vec<ToolKind>) -> Self {
        Self {
            working_dir: working_dir.into(),
            tools,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn tools(&self) -> &[ToolKind] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|kind| self.tools.contains(kind))
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        let kind = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let dir = self.working_dir.as_path();

        tracing::debug!(tool = name, "Executing tool");
        let result = match kind {
            ToolKind::ReadFile => fs::read_file(dir, args).await,
            ToolKind::WriteFile => fs::write_file(dir, args).await,
            ToolKind::ListFiles => fs::list_files(dir, args).await,
            ToolKind::SearchCode => search::search_code(dir, args).await,
            ToolKind::RunCommand => command::run_command(dir, args).await,
            ToolKind::GitInfo => git::git_info(dir, args).await,
        };
        if let Err(err) = &result {
            tracing::info!(tool = name, error = %err, "Tool failed");
        }
        result
    }

    fn needs_approval(&self, name: &str) -> bool {
        // Unregistered names are gated too; they fail once approved.
        self.get(name).map_or(true, ToolKind::needs_approval)
    }

    fn approval_preview(&self, name: &str, args: &ToolArgs) -> String {
        approval_preview(name, args, &self.working_dir)
    }
}

const WRITE_PREVIEW_CHARS: usize = 500;

/// Describe a pending call for the approval prompt.
pub fn approval_preview(name: &str, args: &ToolArgs, working_dir: &Path) -> String {
    match ToolKind::from_name(name) {
        Some(ToolKind::RunCommand) => {
            let command = optional_str(args, "command").unwrap_or_default();
            let timeout = command::timeout_secs(args);
            format!(
                "Execute command:\n\n  $ {command}\n\nTimeout: {timeout} seconds\nWorking directory: {}",
                working_dir.display()
            )
        }
        Some(ToolKind::WriteFile) => {
            let path = optional_str(args, "path").unwrap_or_default();
            let content = optional_str(args, "content").unwrap_or_default();
            format!(
                "Write to file: {path}\n\nContent:\n{}",
                truncate_chars(content, WRITE_PREVIEW_CHARS)
            )
        }
        _ => {
            let args = serde_json::to_string_pretty(args).unwrap_or_default();
            format!("Run tool: {name}\n\nArguments:\n{args}")
        }
    }
}

pub(crate) fn required_str<'a>(args: &'a ToolArgs, key: &'static str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument(key)),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(ToolError::InvalidArgument {
            name: key,
            expected: "a string",
        }),
    }
}

/// A non-empty string argument, if present.
pub(crate) fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Numeric arguments may arrive as integers or floats.
pub(crate) fn optional_i64(args: &ToolArgs, key: &str) -> Option<i64> {
    let value = args.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|float| float as i64))
}

pub(crate) fn optional_bool(args: &ToolArgs, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// Resolve `path` against the working directory unless it is absolute.
pub(crate) fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}\n... (truncated)", &text[..byte]),
        None => text.to_string(),
    }
}
