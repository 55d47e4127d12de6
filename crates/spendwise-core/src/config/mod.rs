//! Configuration module for Spendwise Core.
//!
//! Configuration is read from a TOML file with a `[learning]` table and an
//! optional `[model]` table. Every field has a default, so an empty file is a
//! valid configuration. `SPENDWISE_LEARNING_*` environment variables override
//! file values.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use spendwise_abstraction::{ModelError, StructuredModel};
use spendwise_models::{ModelConfig, ModelFactory, ModelType};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override has an unusable value.
    #[error("Invalid value '{value}' for {key}")]
    InvalidEnv {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// The model section names an unknown provider or the provider failed to build.
    #[error("Model configuration error: {0}")]
    Model(#[from] ModelError),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_true() -> bool {
    true
}

fn default_max_commit_attempts() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_skills_per_section() -> usize {
    5
}

/// Learning pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LearningConfig {
    /// Whether learning runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Commit attempts before the batch is handed to the retry queue.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
    /// Limit for the Reflector call.
    #[serde(default = "default_timeout_ms")]
    pub reflector_timeout_ms: u64,
    /// Limit for the SkillManager call.
    #[serde(default = "default_timeout_ms")]
    pub skill_manager_timeout_ms: u64,
    /// Limit for each storage call.
    #[serde(default = "default_timeout_ms")]
    pub storage_timeout_ms: u64,
    /// Skills per section shown to the models.
    #[serde(default = "default_max_skills_per_section")]
    pub max_skills_per_section: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_commit_attempts: default_max_commit_attempts(),
            reflector_timeout_ms: default_timeout_ms(),
            skill_manager_timeout_ms: default_timeout_ms(),
            storage_timeout_ms: default_timeout_ms(),
            max_skills_per_section: default_max_skills_per_section(),
        }
    }
}

/// Top-level layout of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    learning: LearningConfig,
    #[serde(default)]
    model: Option<ModelConfigSection>,
}

impl LearningConfig {
    /// Creates a configuration with defaults and the given enabled flag.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled, ..Default::default() }
    }

    /// Disables learning.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Parses the `[learning]` table of a TOML document.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` if the document is malformed
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.learning)
    }

    /// Loads the `[learning]` table from a file, then applies environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or an override is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading learning configuration");
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)?.with_env_overrides()
    }

    /// Applies `SPENDWISE_LEARNING_*` environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` if a variable does not parse
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv { key: key.to_string(), value })
        }

        if let Some(v) = lookup("SPENDWISE_LEARNING_ENABLED") {
            self.enabled = parse("SPENDWISE_LEARNING_ENABLED", v)?;
        }
        if let Some(v) = lookup("SPENDWISE_LEARNING_MAX_COMMIT_ATTEMPTS") {
            self.max_commit_attempts = parse("SPENDWISE_LEARNING_MAX_COMMIT_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("SPENDWISE_LEARNING_REFLECTOR_TIMEOUT_MS") {
            self.reflector_timeout_ms = parse("SPENDWISE_LEARNING_REFLECTOR_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("SPENDWISE_LEARNING_SKILL_MANAGER_TIMEOUT_MS") {
            self.skill_manager_timeout_ms = parse("SPENDWISE_LEARNING_SKILL_MANAGER_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("SPENDWISE_LEARNING_STORAGE_TIMEOUT_MS") {
            self.storage_timeout_ms = parse("SPENDWISE_LEARNING_STORAGE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("SPENDWISE_LEARNING_MAX_SKILLS_PER_SECTION") {
            self.max_skills_per_section = parse("SPENDWISE_LEARNING_MAX_SKILLS_PER_SECTION", v)?;
        }

        Ok(self)
    }

    /// Reflector call limit.
    pub fn reflector_timeout(&self) -> Duration {
        Duration::from_millis(self.reflector_timeout_ms)
    }

    /// SkillManager call limit.
    pub fn skill_manager_timeout(&self) -> Duration {
        Duration::from_millis(self.skill_manager_timeout_ms)
    }

    /// Per-call storage limit.
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Model configuration section in config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelConfigSection {
    /// The type of model (replay, openai).
    #[serde(default = "default_model_type")]
    pub model_type: String,
    /// The model ID (e.g., "gpt-4o-mini").
    pub model_id: String,
    /// Optional API key override (if not provided, will be loaded from environment).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Optional base URL for OpenAI-compatible endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model_type() -> String {
    "replay".to_string()
}

impl ModelConfigSection {
    /// Reads the `[model]` table of a TOML document, if present.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` if the document is malformed
    pub fn from_toml_str(contents: &str) -> Result<Option<Self>> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.model)
    }

    /// Builds the configured model client.
    ///
    /// # Errors
    /// Returns `ConfigError::Model` for an unknown model type or a missing API key
    pub fn build_model(&self) -> Result<Arc<dyn StructuredModel>> {
        let model_type: ModelType = self.model_type.parse().map_err(|()| {
            ModelError::UnsupportedModelProvider(format!("Unrecognized model type: {}", self.model_type))
        })?;

        let mut config = ModelConfig::new(model_type, self.model_id.clone());
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }

        Ok(ModelFactory::create(config)?)
    }
}
