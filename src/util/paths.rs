//! Path utilities for the gula-ai data directory

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable that relocates the data directory
pub const CONFIG_DIR_ENV: &str = "GULA_CONFIG_DIR";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// Without a custom path, `GULA_CONFIG_DIR` or `~/.gula-agent` is used.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if DATA_DIR.set(path.clone()).is_err() {
        tracing::debug!(path = %path.display(), "Data directory already initialized");
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".gula-agent"))
        .unwrap_or_else(|| PathBuf::from(".gula-agent"))
}

/// Base data directory
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// `<data dir>/logs`
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// `<data dir>/logs/gula-ai.log`
pub fn log_file_path() -> PathBuf {
    logs_dir().join("gula-ai.log")
}

/// `<data dir>/config.toml`
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
