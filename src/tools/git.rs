use std::fmt::Write as _;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use super::{optional_i64, optional_str, required_str, truncate_chars, ToolArgs, ToolError};

const DEFAULT_LOG_COUNT: i64 = 10;
const MAX_LOG_COUNT: i64 = 50;
const MAX_DIFF_CHARS: usize = 10_000;

pub(super) async fn git_info(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    match required_str(args, "action")? {
        "status" => status(working_dir).await,
        "log" => {
            let count = optional_i64(args, "count").unwrap_or(DEFAULT_LOG_COUNT);
            log(working_dir, count.clamp(1, MAX_LOG_COUNT)).await
        }
        "diff" => diff(working_dir, optional_str(args, "file")).await,
        "branch" => branch(working_dir).await,
        other => Err(ToolError::UnknownAction(other.to_string())),
    }
}

async fn run_git(working_dir: &Path, args: &[&str]) -> Result<String, ToolError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| ToolError::Git(err.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => output.status.to_string(),
            trimmed => trimmed.to_string(),
        };
        return Err(ToolError::Git(message));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn or_placeholder(output: String, placeholder: &str) -> String {
    if output.trim().is_empty() {
        placeholder.to_string()
    } else {
        output
    }
}

async fn status(working_dir: &Path) -> Result<String, ToolError> {
    let output = run_git(working_dir, &["status", "--short", "--branch"]).await?;
    Ok(or_placeholder(output, "(no changes)"))
}

async fn log(working_dir: &Path, count: i64) -> Result<String, ToolError> {
    let max_count = format!("--max-count={count}");
    let output = run_git(
        working_dir,
        &["log", &max_count, "--pretty=format:%h %s (%ar) <%an>"],
    )
    .await?;
    Ok(or_placeholder(output, "(no commits)"))
}

async fn diff(working_dir: &Path, file: Option<&str>) -> Result<String, ToolError> {
    let output = match file {
        Some(file) => run_git(working_dir, &["diff", "--", file]).await?,
        None => run_git(working_dir, &["diff"]).await?,
    };
    let output = or_placeholder(output, "(no changes)");
    Ok(truncate_chars(&output, MAX_DIFF_CHARS))
}

async fn branch(working_dir: &Path) -> Result<String, ToolError> {
    let current = run_git(working_dir, &["branch", "--show-current"]).await?;
    let current = current.trim();
    let all = run_git(working_dir, &["branch", "-a", "--format=%(refname:short)"]).await?;

    let mut output = format!("Current branch: {current}\n\nAll branches:\n");
    for name in all.lines().map(str::trim).filter(|name| !name.is_empty()) {
        let marker = if name == current { '*' } else { ' ' };
        let _ = writeln!(output, "{marker} {name}");
    }
    Ok(output)
}
