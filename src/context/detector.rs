use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Go,
    Rust,
    Node,
    Python,
    Java,
    Ruby,
    Unknown,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Go => "go",
            ProjectType::Rust => "rust",
            ProjectType::Node => "node",
            ProjectType::Python => "python",
            ProjectType::Java => "java",
            ProjectType::Ruby => "ruby",
            ProjectType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub project_type: ProjectType,
    pub root: PathBuf,
    pub has_git: bool,
    /// Build and dependency files found next to the marker
    pub config_files: Vec<String>,
    pub main_file: Option<String>,
}

impl ProjectInfo {
    /// `name (type project) [git]`
    pub fn summary(&self) -> String {
        let mut summary = format!("{} ({} project)", self.name, self.project_type.as_str());
        if self.has_git {
            summary.push_str(" [git]");
        }
        summary
    }
}

/// Marker file, detected type, related config files. First match wins.
const MARKERS: &[(&str, ProjectType, &[&str])] = &[
    ("go.mod", ProjectType::Go, &["go.mod", "go.sum"]),
    ("Cargo.toml", ProjectType::Rust, &["Cargo.toml", "Cargo.lock"]),
    (
        "package.json",
        ProjectType::Node,
        &["package.json", "package-lock.json", "yarn.lock"],
    ),
    (
        "pyproject.toml",
        ProjectType::Python,
        &["pyproject.toml", "setup.py", "requirements.txt"],
    ),
    (
        "requirements.txt",
        ProjectType::Python,
        &["requirements.txt", "setup.py"],
    ),
    ("pom.xml", ProjectType::Java, &["pom.xml"]),
    (
        "build.gradle",
        ProjectType::Java,
        &["build.gradle", "build.gradle.kts"],
    ),
    ("Gemfile", ProjectType::Ruby, &["Gemfile", "Gemfile.lock"]),
];

pub fn detect_project(dir: &Path) -> ProjectInfo {
    let exists = |name: &str| dir.join(name).exists();

    let (project_type, config_files) = MARKERS
        .iter()
        .find(|(marker, _, _)| exists(*marker))
        .map(|(_, kind, configs)| {
            let found = configs
                .iter()
                .filter(|name| exists(**name))
                .map(|name| name.to_string())
                .collect();
            (*kind, found)
        })
        .unwrap_or((ProjectType::Unknown, Vec::new()));

    let candidates: &[&str] = match project_type {
        ProjectType::Go => &["main.go"],
        ProjectType::Python => &["main.py", "app.py", "__main__.py"],
        ProjectType::Node => &["index.js"],
        ProjectType::Rust => &["src/main.rs", "src/lib.rs"],
        _ => &[],
    };
    let main_file = candidates
        .iter()
        .find(|candidate| exists(**candidate))
        .map(|candidate| candidate.to_string());

    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    ProjectInfo {
        name,
        project_type,
        root: dir.to_path_buf(),
        has_git: exists(".git"),
        config_files,
        main_file,
    }
}
