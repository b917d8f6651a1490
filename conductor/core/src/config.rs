//! Configuration
//!
//! Settings are resolved in three layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`$XDG_CONFIG_HOME/chat-conductor/config.toml` by default)
//! 3. Environment variables
//!
//! ```toml
//! model = "llama2"
//! context_budget = 4096
//! event_buffer = 100
//!
//! [backend]
//! host = "localhost"
//! port = 11434
//! stream = true
//! text_field = "response"
//! request_timeout_secs = 0
//! ```
//!
//! # Environment Variables
//!
//! - `CHAT_MODEL`: Model name
//! - `CHAT_CONTEXT_BUDGET`: Context budget in characters
//! - `OLLAMA_HOST`: Ollama server host
//! - `OLLAMA_PORT`: Ollama server port
//! - `OLLAMA_STREAM`: `0`/`false` for single-response mode
//! - `OLLAMA_TIMEOUT_SECS`: Request timeout (0 = none)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendConfig;
use crate::streaming::DEFAULT_EVENT_BUFFER;

/// Default context budget in characters
pub const DEFAULT_CONTEXT_BUDGET: usize = 4096;

/// Default model name
pub const DEFAULT_MODEL: &str = "llama2";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// An override could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Rejected value
        value: String,
    },

    /// The context budget must be positive
    #[error("context budget must be greater than zero")]
    InvalidBudget,
}

/// Coordinator configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Model to generate with
    pub model: String,
    /// Maximum cumulative content length kept in the conversation
    pub context_budget: usize,
    /// Capacity of each session's worker channel
    pub event_buffer: usize,
    /// Backend connection
    pub backend: BackendConfig,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            context_budget: DEFAULT_CONTEXT_BUDGET,
            event_buffer: DEFAULT_EVENT_BUFFER,
            backend: BackendConfig::default(),
        }
    }
}

impl ConductorConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (usually the environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("CHAT_MODEL") {
            self.model = model;
        }
        if let Some(budget) = lookup("CHAT_CONTEXT_BUDGET") {
            self.context_budget = parse_value("CHAT_CONTEXT_BUDGET", &budget)?;
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.backend.host = host;
        }
        if let Some(port) = lookup("OLLAMA_PORT") {
            self.backend.port = parse_value("OLLAMA_PORT", &port)?;
        }
        if let Some(stream) = lookup("OLLAMA_STREAM") {
            self.backend.stream = parse_flag("OLLAMA_STREAM", &stream)?;
        }
        if let Some(timeout) = lookup("OLLAMA_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = parse_value("OLLAMA_TIMEOUT_SECS", &timeout)?;
        }
        self.validate()
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_budget == 0 {
            return Err(ConfigError::InvalidBudget);
        }
        Ok(())
    }
}

/// Default config file path
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chat-conductor").join("config.toml"))
}

/// Load config from `path`; a missing file yields defaults
pub fn load_config_from_path(path: &Path) -> Result<ConductorConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = ?path, "No config file, using defaults");
            return Ok(ConductorConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config: ConductorConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    tracing::info!(path = ?path, model = %config.model, "Loaded config file");
    Ok(config)
}

/// Load the default config file, then apply environment overrides
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    let mut config = match default_config_path() {
        Some(path) => load_config_from_path(&path)?,
        None => ConductorConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
