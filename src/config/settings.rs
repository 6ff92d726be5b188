use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

pub const DEFAULT_API_URL: &str = "https://agent.rudo.es";
pub const DEFAULT_MODEL: &str = "claude-sonnet";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Agent service base URL
    pub api_url: String,
    /// Bearer token for the agent service
    pub access_token: Option<String>,
    /// Model requested for new conversations
    pub default_model: String,
    /// Ask the server to search the indexed codebase
    pub rag_enabled: bool,
    /// Directory local tools run in
    pub working_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            default_model: DEFAULT_MODEL.to_string(),
            rag_enabled: true,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    pub default_model: Option<String>,
    pub rag_enabled: Option<bool>,
    pub working_dir: Option<PathBuf>,
    /// Accepted so older config files still load. The server chooses generation settings.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Config {
    /// Load from the default location, creating the example file on first run, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            Self::create_default_config(&path);
        }
        Self::load_from(&path)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(contents) => {
                Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Config::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(api_url) = toml_config.api_url {
            self.api_url = api_url;
        }
        if let Some(token) = toml_config.access_token.filter(|token| !token.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(model) = toml_config.default_model {
            self.default_model = model;
        }
        if let Some(rag_enabled) = toml_config.rag_enabled {
            self.rag_enabled = rag_enabled;
        }
        if let Some(dir) = toml_config.working_dir {
            self.working_dir = dir;
        }
        if toml_config.max_tokens.is_some() || toml_config.temperature.is_some() {
            tracing::debug!("Ignoring max_tokens and temperature");
        }
    }

    /// Apply `GULA_API_KEY`, `GULA_API_URL` and `AGENT_API_URL`, the last taking precedence.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(token) = lookup("GULA_API_KEY") {
            self.access_token = Some(token);
        }
        if let Some(url) = lookup("GULA_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("AGENT_API_URL") {
            self.api_url = url;
        }
    }

    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "Failed to create config directory");
                return;
            }
        }
        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_rag(mut self, enabled: bool) -> Self {
        self.rag_enabled = enabled;
        self
    }
}
