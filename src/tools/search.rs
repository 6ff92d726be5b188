use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use ignore::WalkBuilder;
use regex::Regex;
use serde_json::Value;

use super::{optional_str, required_str, resolve_path, ToolArgs, ToolError};

const MAX_MATCHES: usize = 100;
const MAX_FILES: usize = 500;
const MAX_LINE_CHARS: usize = 120;
const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", "__pycache__", "venv"];

const DEFAULT_EXTENSIONS: &[&str] = &[
    "go", "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "h", "hpp", "rs", "rb", "php",
    "swift", "kt", "sh", "bash", "zsh", "json", "yaml", "yml", "toml", "md", "txt", "sql",
];

#[derive(Debug)]
struct Match {
    file: String,
    line: usize,
    content: String,
}

pub(super) async fn search_code(working_dir: &Path, args: &ToolArgs) -> Result<String, ToolError> {
    let pattern = required_str(args, "pattern")?.to_string();
    let regex = Regex::new(&pattern).map_err(|err| ToolError::InvalidPattern(err.to_string()))?;
    let root = match optional_str(args, "path") {
        Some(path) => resolve_path(working_dir, path),
        None => working_dir.to_path_buf(),
    };
    let extensions = extensions(args.get("file_types"));

    let matches = tokio::task::spawn_blocking(move || scan(&root, &regex, &extensions))
        .await
        .map_err(|err| ToolError::Task(err.to_string()))?;

    Ok(format_matches(&pattern, &matches))
}

/// Extensions to search, without the leading dot. Accepts a list or a comma separated string.
fn extensions(file_types: Option<&Value>) -> HashSet<String> {
    let raw: Vec<String> = match file_types {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(list)) => list.split(',').map(String::from).collect(),
        _ => DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
    };

    raw.iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_string())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn scan(root: &Path, regex: &Regex, extensions: &HashSet<String>) -> Vec<Match> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            !(is_dir && SKIPPED_DIRS.iter().any(|skip| entry.file_name() == *skip))
        })
        .build();

    let mut matches = Vec::new();
    let mut files_searched = 0usize;

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(ext));
        if !wanted {
            continue;
        }

        files_searched += 1;
        if files_searched > MAX_FILES {
            break;
        }

        // Unreadable or binary files are skipped.
        let Ok(text) = std::fs::read_to_string(path) else {
            continue;
        };
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        for (index, line) in text.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if matches.len() >= MAX_MATCHES {
                return matches;
            }
            matches.push(Match {
                file: relative.clone(),
                line: index + 1,
                content: truncate_line(line),
            });
        }
    }
    matches
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let kept: String = line.chars().take(MAX_LINE_CHARS - 3).collect();
    format!("{kept}...")
}

fn format_matches(pattern: &str, matches: &[Match]) -> String {
    if matches.is_empty() {
        return format!("No matches found for pattern: {pattern}");
    }

    let mut output = format!("Found {} matches for pattern: {pattern}\n\n", matches.len());
    let mut current_file: Option<&str> = None;
    for found in matches {
        if current_file != Some(found.file.as_str()) {
            current_file = Some(&found.file);
            let _ = writeln!(output, "\n=== {} ===", found.file);
        }
        let _ = writeln!(output, "{:>4}: {}", found.line, found.content);
    }
    if matches.len() >= MAX_MATCHES {
        let _ = write!(output, "\n... (limited to {MAX_MATCHES} matches)");
    }
    output
}
