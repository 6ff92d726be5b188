//! Project context attached to chat requests.

mod detector;
mod tree;

use std::path::Path;

use serde_json::{json, Value};

pub use detector::{detect_project, ProjectInfo, ProjectType};
pub use tree::{compact_tree, generate_tree, TreeOptions};

/// `{project: {name, type, has_git}, tree}` for the working directory.
///
/// Returns `None` when the directory cannot be read.
pub fn project_context(working_dir: &Path) -> Option<Value> {
    if !working_dir.is_dir() {
        return None;
    }

    let project = detect_project(working_dir);
    let tree = match compact_tree(working_dir) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::debug!(error = %e, dir = %working_dir.display(), "Failed to build project tree");
            return None;
        }
    };

    Some(json!({
        "project": {
            "name": project.name,
            "type": project.project_type.as_str(),
            "has_git": project.has_git,
        },
        "tree": tree,
    }))
}
