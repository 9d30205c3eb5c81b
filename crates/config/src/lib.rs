//! Configuration loading, validation, and management for agentloop.
//!
//! Loads configuration from `~/.agentloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Status-polling loop settings
    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,

    /// Session identity used by the CLI
    #[serde(default)]
    pub session: SessionConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("loop_config", &self.loop_config)
            .field("session", &self.session)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Settings for the status-polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Upper bound on iterations (must be >= 1)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// State key the processing step writes its result under
    #[serde(default = "default_output_key")]
    pub output_key: String,

    /// Field of the structured result holding the status
    #[serde(default = "default_status_field")]
    pub status_field: String,

    /// Status literal that ends the loop
    #[serde(default = "default_terminal_status")]
    pub terminal_status: String,

    /// Status literal reported while work continues
    #[serde(default = "default_pending_status")]
    pub pending_status: String,

    /// Flat key mirroring the derived status (empty disables mirroring)
    #[serde(default = "default_mirror_key")]
    pub mirror_key: String,

    /// Attempts per step when structured output is malformed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Overall wall-clock budget for one loop run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_secs: Option<u64>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_output_key() -> String {
    "status_update".into()
}
fn default_status_field() -> String {
    "status".into()
}
fn default_terminal_status() -> String {
    "completed".into()
}
fn default_pending_status() -> String {
    "pending".into()
}
fn default_mirror_key() -> String {
    "status".into()
}
fn default_max_attempts() -> u32 {
    2
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            output_key: default_output_key(),
            status_field: default_status_field(),
            terminal_status: default_terminal_status(),
            pending_status: default_pending_status(),
            mirror_key: default_mirror_key(),
            max_attempts: default_max_attempts(),
            time_budget_secs: None,
        }
    }
}

impl LoopConfig {
    /// The mirror key, or `None` when mirroring is disabled.
    pub fn mirror_key(&self) -> Option<&str> {
        if self.mirror_key.is_empty() {
            None
        } else {
            Some(&self.mirror_key)
        }
    }
}

/// Application and user identity for sessions created by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_app_name() -> String {
    "status_app".into()
}
fn default_user_id() -> String {
    "user123".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            user_id: default_user_id(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentloop/config.toml).
    ///
    /// Also checks environment variables for API keys, in order:
    /// `AGENTLOOP_API_KEY`, `GOOGLE_API_KEY`, `GEMINI_API_KEY`, `OPENAI_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
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

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = ["AGENTLOOP_API_KEY", "GOOGLE_API_KEY", "GEMINI_API_KEY", "OPENAI_API_KEY"]
                .iter()
                .find_map(|name| lookup(name));
        }

        if let Some(provider) = lookup("AGENTLOOP_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("AGENTLOOP_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.loop_config.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations must be at least 1".into(),
            ));
        }

        if self.loop_config.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_attempts must be at least 1".into(),
            ));
        }

        if self.loop_config.terminal_status == self.loop_config.pending_status {
            return Err(ConfigError::ValidationError(
                "loop.terminal_status and loop.pending_status must differ".into(),
            ));
        }

        if self.loop_config.output_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "loop.output_key must not be empty".into(),
            ));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
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
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            loop_config: LoopConfig::default(),
            session: SessionConfig::default(),
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.loop_config.max_iterations, 10);
        assert_eq!(config.loop_config.output_key, "status_update");
        assert_eq!(config.loop_config.mirror_key(), Some("status"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[loop]"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, "gemini-2.0-flash");
        assert_eq!(parsed.loop_config.terminal_status, "completed");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.loop_config.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn identical_status_literals_rejected() {
        let mut config = AppConfig::default();
        config.loop_config.pending_status = "completed".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn load_from_file_with_loop_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "openai"
default_model = "gpt-4o-mini"

[loop]
max_iterations = 4
mirror_key = ""
time_budget_secs = 30

[session]
app_name = "tool_app"

[providers.openai]
api_url = "http://localhost:9999/v1"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.loop_config.max_iterations, 4);
        assert_eq!(config.loop_config.mirror_key(), None);
        assert_eq!(config.loop_config.time_budget_secs, Some(30));
        assert_eq!(config.loop_config.output_key, "status_update");
        assert_eq!(config.session.app_name, "tool_app");
        assert_eq!(config.session.user_id, "user123");
        assert_eq!(
            config.providers["openai"].api_url.as_deref(),
            Some("http://localhost:9999/v1")
        );
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_temperature = \"hot\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let mut config = AppConfig::default();
        config.apply_env(|name| match name {
            "GEMINI_API_KEY" => Some("gem-key".into()),
            "OPENAI_API_KEY" => Some("oai-key".into()),
            "AGENTLOOP_MODEL" => Some("gemini-2.5-pro".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("gem-key"));
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn configured_key_is_not_overridden() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_keys() {
        let config = AppConfig {
            api_key: Some("secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
