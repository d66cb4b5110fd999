//! Configuration management for the research agent.
//!
//! Keys can be supplied by a flat `config.yaml` file (a string-to-string
//! map, path overridable via `CONFIG_PATH`) or by environment variables.
//! Environment variables take precedence over file values.
//!
//! - `OPENAI_API_KEY` - Required. Key for the completion endpoint.
//! - `SERPER_DEV_API_KEY` - Required. Key for the serper.dev search API.
//! - `MODEL` - Optional. Completion model identifier. Defaults to `gpt-3.5-turbo`.
//! - `TEMPERATURE` - Optional. Sampling temperature. Defaults to `0`.
//! - `MAX_TOKENS` - Optional. Completion token budget. Defaults to `1000`.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read config file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Yaml(String, #[source] serde_yaml::Error),
}

/// Agent configuration.
///
/// Built once at startup and passed by reference to every component that
/// needs credentials; nothing is written back into the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key for the completion endpoint
    pub openai_api_key: String,

    /// Key for the serper.dev search API
    pub serper_api_key: String,

    /// Completion model identifier
    pub model: String,

    /// Sampling temperature for free-text completions
    pub temperature: f32,

    /// Token budget for free-text completions
    pub max_tokens: u32,
}

impl Config {
    /// Load configuration from `config.yaml` (if present) and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if `OPENAI_API_KEY` or
    /// `SERPER_DEV_API_KEY` is set in neither source.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let file_values = if Path::new(&path).exists() {
            read_config_file(&path)?
        } else {
            HashMap::new()
        };

        Self::resolve(&file_values, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a file map plus an environment lookup.
    /// Environment values win over file values.
    fn resolve(
        file_values: &HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).or_else(|| file_values.get(key).cloned());

        let openai_api_key = lookup("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingKey("OPENAI_API_KEY".to_string()))?;

        let serper_api_key = lookup("SERPER_DEV_API_KEY")
            .ok_or_else(|| ConfigError::MissingKey("SERPER_DEV_API_KEY".to_string()))?;

        let model = lookup("MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let temperature = lookup("TEMPERATURE")
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("TEMPERATURE".to_string(), format!("{}", e)))?;

        let max_tokens = lookup("MAX_TOKENS")
            .unwrap_or_else(|| "1000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("MAX_TOKENS".to_string(), format!("{}", e)))?;

        Ok(Self {
            openai_api_key,
            serper_api_key,
            model,
            temperature,
            max_tokens,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(openai_api_key: String, serper_api_key: String) -> Self {
        Self {
            openai_api_key,
            serper_api_key,
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_tokens: 1000,
        }
    }
}

/// Read a flat key/value YAML file. Unrecognized keys are carried in the map
/// and simply never looked up; nothing is exported to the process
/// environment.
fn read_config_file(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.to_string(), e))?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml(path.to_string(), e))
}
