//! Configuration loading, validation, and management for Charmline.
//!
//! Loads configuration from `~/.charmline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use charmline_core::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.charmline/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend used when a request does not name one
    #[serde(default)]
    pub default_backend: Backend,

    /// Sampling temperature for every completion call
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a single completion call before the turn fails
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Context window budget
    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// TOML file of personas to seed the catalog with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personas_file: Option<PathBuf>,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_completion_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderConfig,
}

fn default_openai() -> ProviderConfig {
    ProviderConfig {
        api_key: None,
        api_url: None,
        model: "gpt-4".into(),
    }
}

fn default_anthropic() -> ProviderConfig {
    ProviderConfig {
        api_key: None,
        api_url: None,
        model: "claude-3-opus-20240229".into(),
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            anthropic: default_anthropic(),
        }
    }
}

impl ProvidersConfig {
    pub fn for_backend(&self, backend: Backend) -> &ProviderConfig {
        match backend {
            Backend::OpenAi => &self.openai,
            Backend::Anthropic => &self.anthropic,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    pub model: String,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Token budget for the history sent to the persona backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Tokens reserved for the system instruction scaffolding
    #[serde(default = "default_system_overhead")]
    pub system_overhead: usize,

    /// Hard ceiling on estimated prompt tokens
    #[serde(default = "default_window_tokens")]
    pub max_tokens: usize,

    /// Hard ceiling on windowed turns
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Turns of full history folded into the truncation summary
    #[serde(default = "default_summary_tail")]
    pub summary_tail: usize,

    /// Character cap on the truncation summary
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

fn default_system_overhead() -> usize {
    1000
}
fn default_window_tokens() -> usize {
    8000
}
fn default_max_turns() -> usize {
    20
}
fn default_summary_tail() -> usize {
    5
}
fn default_summary_chars() -> usize {
    100
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            system_overhead: default_system_overhead(),
            max_tokens: default_window_tokens(),
            max_turns: default_max_turns(),
            summary_tail: default_summary_tail(),
            summary_chars: default_summary_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.charmline/charmline.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("charmline.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.charmline/config.toml).
    ///
    /// Environment overrides:
    /// - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` fill missing provider keys
    /// - `CHARMLINE_BACKEND` replaces the default backend
    /// - `CHARMLINE_DATABASE` replaces the SQLite path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.providers.openai.api_key.is_none() {
            self.providers.openai.api_key = lookup("OPENAI_API_KEY");
        }
        if self.providers.anthropic.api_key.is_none() {
            self.providers.anthropic.api_key = lookup("ANTHROPIC_API_KEY");
        }
        if let Some(backend) = lookup("CHARMLINE_BACKEND") {
            self.default_backend = backend.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(path) = lookup("CHARMLINE_DATABASE") {
            self.store.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".charmline")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.completion_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "completion_timeout_secs must be > 0".into(),
            ));
        }

        if self.window.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "window.max_turns must be > 0".into(),
            ));
        }

        if self.window.system_overhead >= self.window.max_tokens {
            return Err(ConfigError::ValidationError(
                "window.system_overhead must be below window.max_tokens".into(),
            ));
        }

        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "store.backend must be 'sqlite' or 'memory', got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Whether the given backend has credentials.
    pub fn has_api_key(&self, backend: Backend) -> bool {
        self.providers.for_backend(backend).api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_backend: Backend::default(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            completion_timeout_secs: default_completion_timeout(),
            providers: ProvidersConfig::default(),
            window: WindowConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            personas_file: None,
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

impl From<ConfigError> for charmline_core::Error {
    fn from(e: ConfigError) -> Self {
        charmline_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_backend, Backend::OpenAi);
        assert_eq!(config.window.system_overhead, 1000);
        assert_eq!(config.window.max_tokens, 8000);
        assert_eq!(config.window.max_turns, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_backend, config.default_backend);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.providers.anthropic.model, "claude-3-opus-20240229");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overhead_above_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.window.system_overhead = 9000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_backend, Backend::OpenAi);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_backend = "anthropic"

[window]
max_turns = 10

[providers.openai]
model = "gpt-4o"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_backend, Backend::Anthropic);
        assert_eq!(config.window.max_turns, 10);
        assert_eq!(config.window.max_tokens, 8000);
        assert_eq!(config.providers.openai.model, "gpt-4o");
        assert_eq!(config.providers.anthropic.model, "claude-3-opus-20240229");
    }

    #[test]
    fn env_overrides_fill_keys_and_backend() {
        let mut config = AppConfig::default();
        config
            .apply_env(|key| match key {
                "OPENAI_API_KEY" => Some("sk-openai".into()),
                "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
                "CHARMLINE_BACKEND" => Some("anthropic".into()),
                _ => None,
            })
            .unwrap();
        assert!(config.has_api_key(Backend::OpenAi));
        assert!(config.has_api_key(Backend::Anthropic));
        assert_eq!(config.default_backend, Backend::Anthropic);
    }

    #[test]
    fn env_does_not_replace_configured_key() {
        let mut config = AppConfig::default();
        config.providers.openai.api_key = Some("from-file".into());
        config
            .apply_env(|key| (key == "OPENAI_API_KEY").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(config.providers.openai.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn bad_backend_env_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|key| (key == "CHARMLINE_BACKEND").then(|| "bard".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig::default();
        config.providers.openai.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openai"));
        assert!(toml_str.contains("8000"));
    }
}
