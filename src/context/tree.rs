use std::fs;
use std::io;
use std::path::Path;

use ignore::{DirEntry, WalkBuilder};

/// Directories never descended into
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "vendor",
    "target",
    "build",
    "dist",
    ".cache",
    ".idea",
    ".vscode",
    "coverage",
    ".pytest_cache",
    ".mypy_cache",
];

const TRUNCATED_MARKER: &str = "\n... (tree truncated)\n";

#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    /// Deepest level listed, counting the root's children as 0
    pub max_depth: usize,
    pub max_entries: usize,
    pub show_hidden: bool,
}

impl TreeOptions {
    pub const COMPACT: TreeOptions = TreeOptions {
        max_depth: 2,
        max_entries: 50,
        show_hidden: false,
    };
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_entries: 100,
            show_hidden: false,
        }
    }
}

/// Tree of `root` with at most two levels and 50 entries
pub fn compact_tree(root: &Path) -> io::Result<String> {
    generate_tree(root, TreeOptions::COMPACT)
}

/// Box-drawing tree, directories first and suffixed `/`
pub fn generate_tree(root: &Path, options: TreeOptions) -> io::Result<String> {
    if !fs::metadata(root)?.is_dir() {
        return Err(io::Error::other(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let entries = walk(root, options);
    Ok(render(&entries, options.max_entries))
}

struct TreeEntry {
    /// Zero for the root's children
    depth: usize,
    name: String,
    is_dir: bool,
}

/// Depth-first listing with siblings already in display order.
fn walk(root: &Path, options: TreeOptions) -> Vec<TreeEntry> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(!options.show_hidden)
        .max_depth(Some(options.max_depth + 1))
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored_dir(entry))
        .sort_by_file_path(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.file_name().cmp(&b.file_name()))
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            // Unreadable subdirectories are listed but not expanded
            Err(e) => {
                tracing::trace!(error = %e, "Skipping unreadable tree entry");
                None
            }
        })
        .filter(|entry| entry.depth() > 0)
        .map(|entry| TreeEntry {
            depth: entry.depth() - 1,
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type().is_some_and(|kind| kind.is_dir()),
        })
        .collect()
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_some_and(|kind| kind.is_dir())
        && IGNORED_DIRS.iter().any(|name| entry.file_name() == *name)
}

fn render(entries: &[TreeEntry], max_entries: usize) -> String {
    let last = last_siblings(entries);
    let mut out = String::new();
    // Whether each open ancestor was the last of its siblings
    let mut ancestors: Vec<bool> = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if index >= max_entries {
            out.push_str(TRUNCATED_MARKER);
            break;
        }

        ancestors.truncate(entry.depth);
        for ancestor_last in &ancestors {
            out.push_str(if *ancestor_last { "    " } else { "│   " });
        }
        out.push_str(if last[index] { "└── " } else { "├── " });
        out.push_str(&entry.name);
        if entry.is_dir {
            out.push('/');
        }
        out.push('\n');
        ancestors.push(last[index]);
    }
    out
}

/// For each entry, whether no later sibling follows it.
fn last_siblings(entries: &[TreeEntry]) -> Vec<bool> {
    let mut last = vec![false; entries.len()];
    // `followed[d]`: a later entry at depth `d` shares the current parent
    let mut followed: Vec<bool> = Vec::new();

    for (index, entry) in entries.iter().enumerate().rev() {
        last[index] = !followed.get(entry.depth).copied().unwrap_or(false);
        followed.truncate(entry.depth);
        followed.resize(entry.depth, false);
        followed.push(true);
    }
    last
}
