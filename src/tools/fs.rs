use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glob::Pattern;
use ignore::WalkBuilder;

use super::{optional_bool, optional_i64, optional_str, required_str, resolve_path, ToolArgs, ToolError};

const MAX_READ_BYTES: u64 = 1024 * 1024;
const MAX_LISTED_FILES: usize = 1000;

pub(super) async fn read_file(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    let path = resolve_path(working_dir, required_str(args, "path")?);

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(not_found_or("file", &path, "error accessing file"))?;
    if metadata.is_dir() {
        return Err(ToolError::NotAFile(path));
    }
    if metadata.len() > MAX_READ_BYTES {
        return Err(ToolError::TooLarge(path));
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(ToolError::io("error reading file"))?;
    let text = String::from_utf8_lossy(&bytes);

    let start = optional_i64(args, "start_line").unwrap_or(1).max(1) as usize;
    let end = optional_i64(args, "end_line").filter(|end| *end > 0);

    let lines: Vec<String> = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .skip_while(|(number, _)| *number < start)
        .take_while(|(number, _)| end.map_or(true, |end| *number as i64 <= end))
        .map(|(number, line)| format!("{number:>4} | {line}"))
        .collect();

    if lines.is_empty() {
        return Ok("(empty file or no lines in specified range)".to_string());
    }
    Ok(lines.join("\n"))
}

pub(super) async fn write_file(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    let path = resolve_path(working_dir, required_str(args, "path")?);
    let content = required_str(args, "content")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ToolError::io("failed to create directory"))?;
    }

    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
    tokio::fs::write(&path, content)
        .await
        .map_err(ToolError::io("failed to write file"))?;

    let verb = if existed { "updated" } else { "created" };
    tracing::info!(path = %path.display(), bytes = content.len(), "File {verb}");
    Ok(format!(
        "File {verb}: {} ({} bytes)",
        path.display(),
        content.len()
    ))
}

pub(super) async fn list_files(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    let root = match optional_str(args, "path") {
        Some(path) => resolve_path(working_dir, path),
        None => working_dir.to_path_buf(),
    };
    let pattern = optional_str(args, "pattern").unwrap_or("*");
    let pattern = Pattern::new(pattern).map_err(|err| ToolError::InvalidPattern(err.to_string()))?;
    let recursive = optional_bool(args, "recursive").unwrap_or(false);

    let metadata = tokio::fs::metadata(&root)
        .await
        .map_err(not_found_or("directory", &root, "error accessing directory"))?;
    if !metadata.is_dir() {
        return Err(ToolError::NotADirectory(root));
    }

    let mut files = tokio::task::spawn_blocking(move || {
        if recursive {
            walk_matching(&root, &pattern)
        } else {
            list_matching(&root, &pattern)
        }
    })
    .await
    .map_err(|err| ToolError::Task(err.to_string()))??;

    if files.is_empty() {
        return Ok("(no files found matching pattern)".to_string());
    }

    files.sort();
    let limited = files.len() >= MAX_LISTED_FILES;
    let mut output = files.join("\n");
    if limited {
        output.push_str(&format!("\n... (limited to {MAX_LISTED_FILES} files)"));
    }
    Ok(output)
}

fn list_matching(root: &Path, pattern: &Pattern) -> Result<Vec<String>, ToolError> {
    let entries = std::fs::read_dir(root).map_err(ToolError::io("error reading directory"))?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        if files.len() >= MAX_LISTED_FILES {
            break;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !pattern.matches(&name) {
            continue;
        }
        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        files.push(if is_dir { format!("{name}/") } else { name });
    }
    Ok(files)
}

/// Files below `root` whose name matches, skipping hidden directories.
fn walk_matching(root: &Path, pattern: &Pattern) -> Result<Vec<String>, ToolError> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .build();

    let mut files = Vec::new();
    for entry in walker.flatten() {
        if files.len() >= MAX_LISTED_FILES {
            break;
        }
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !pattern.matches(&name) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(relative.to_string_lossy().into_owned());
    }
    Ok(files)
}

fn not_found_or(
    what: &'static str,
    path: &Path,
    context: &'static str,
) -> impl FnOnce(std::io::Error) -> ToolError {
    let path: PathBuf = path.to_path_buf();
    move |err| {
        if err.kind() == ErrorKind::NotFound {
            ToolError::NotFound { what, path }
        } else {
            ToolError::Io {
                context,
                source: err,
            }
        }
    }
}
