use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::{optional_i64, required_str, ToolArgs, ToolError};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_STDOUT_CHARS: usize = 10_000;
const MAX_STDERR_CHARS: usize = 5_000;

/// Requested timeout, clamped to a sane range.
pub(super) fn timeout_secs(args: &ToolArgs) -> u64 {
    optional_i64(args, "timeout")
        .map(|secs| secs.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

pub(super) async fn run_command(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    let command = required_str(args, "command")?;
    let timeout = timeout_secs(args);

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.current_dir(working_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    tracing::info!(command, timeout, "Running shell command");
    let output = match tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await {
        Ok(output) => output.map_err(ToolError::io("failed to start command"))?,
        Err(_) => {
            tracing::warn!(command, timeout, "Shell command timed out");
            return Err(ToolError::Timeout(timeout));
        }
    };

    let mut sections = Vec::new();
    if !output.stdout.is_empty() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        sections.push(format!(
            "=== STDOUT ===\n{}",
            super::truncate_chars(&stdout, MAX_STDOUT_CHARS)
        ));
    }
    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        sections.push(format!(
            "=== STDERR ===\n{}",
            super::truncate_chars(&stderr, MAX_STDERR_CHARS)
        ));
    }
    if !output.status.success() {
        sections.push(format!("=== ERROR ===\n{}", output.status));
    }

    if sections.is_empty() {
        return Ok("(no output)".to_string());
    }
    Ok(sections.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_timeout_is_clamped() {
        assert_eq!(timeout_secs(&ToolArgs::new()), 60);
        assert_eq!(timeout_secs(&args(json!({"timeout": 0}))), 1);
        assert_eq!(timeout_secs(&args(json!({"timeout": 90.0}))), 90);
        assert_eq!(timeout_secs(&args(json!({"timeout": 100000}))), 600);
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let dir = TempDir::new().unwrap();
        let output = run_command(
            dir.path(),
            &args(json!({"command": "echo out; echo err >&2"})),
        )
        .await
        .unwrap();
        assert_eq!(output, "=== STDOUT ===\nout\n\n\n=== STDERR ===\nerr\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let output = run_command(dir.path(), &args(json!({"command": "ls"})))
            .await
            .unwrap();
        assert!(output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_silent_command_and_failure_status() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            run_command(dir.path(), &args(json!({"command": "true"})))
                .await
                .unwrap(),
            "(no output)"
        );

        let failed = run_command(dir.path(), &args(json!({"command": "exit 3"})))
            .await
            .unwrap();
        assert!(failed.starts_with("=== ERROR ==="));
    }

    #[tokio::test]
    async fn test_timeout_is_a_tool_error() {
        let dir = TempDir::new().unwrap();
        let err = run_command(dir.path(), &args(json!({"command": "sleep 5", "timeout": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)));
    }
}
