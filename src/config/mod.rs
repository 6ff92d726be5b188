mod settings;

pub use settings::{Config, ConfigError, TomlConfig, DEFAULT_API_URL, DEFAULT_MODEL, EXAMPLE_CONFIG};
