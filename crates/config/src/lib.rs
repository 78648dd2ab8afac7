//! Configuration loading, validation, and management for agentpi.
//!
//! Loads configuration from `~/.agentpi/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentpi_core::agent::ThinkingLevel;
use agentpi_core::model::{Model, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentpi/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key used when a provider section does not carry its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model id to use when none is given on the command line
    #[serde(default = "default_model")]
    pub default_model: String,

    /// System prompt for new agents
    #[serde(default)]
    pub system_prompt: String,

    /// Sampling temperature; omitted from requests when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens per response; omitted from requests when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Requested reasoning effort
    #[serde(default)]
    pub thinking_level: ThinkingLevel,

    /// Extra models, merged over the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<Model>,

    /// Provider-specific configurations
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("thinking_level", &self.thinking_level)
            .field("models", &self.models.iter().map(|m| &m.id).collect::<Vec<_>>())
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the base URL of every model served by this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Pre-issued session token (github-copilot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Token expiry in Unix seconds (github-copilot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("token", &redact(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentpi/config.toml).
    ///
    /// Also checks environment variables:
    /// - `AGENTPI_API_KEY` then `OPENAI_API_KEY` when no key is configured
    /// - `AGENTPI_MODEL` overrides `default_model`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("AGENTPI_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.is_empty());
        }

        if let Ok(model) = std::env::var("AGENTPI_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentpi")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_tokens must be > 0".into(),
            ));
        }

        for model in &self.models {
            if model.id.trim().is_empty() || model.api.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "every [[models]] entry needs a non-empty id and api".into(),
                ));
            }
        }

        Ok(())
    }

    /// The API key for a provider: its own section first, then the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Build the model registry: built-in catalog, then `[[models]]`, then
    /// per-provider base URL overrides.
    pub fn model_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::with_defaults();
        for model in &self.models {
            registry.register(model.clone());
        }

        let overrides: Vec<Model> = registry
            .all()
            .into_iter()
            .filter_map(|m| {
                self.providers
                    .get(&m.provider)
                    .and_then(|p| p.base_url.as_deref())
                    .map(|url| m.with_base_url(url))
            })
            .collect();
        for model in overrides {
            registry.register(model);
        }

        registry
    }

    /// Resolve a model id against the registry.
    pub fn resolve_model(&self, id: &str) -> Result<Model, ConfigError> {
        self.model_registry()
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownModel(id.to_string()))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            system_prompt: String::new(),
            temperature: None,
            max_tokens: None,
            thinking_level: ThinkingLevel::Off,
            models: Vec::new(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),
}
