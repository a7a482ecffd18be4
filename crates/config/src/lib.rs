//! Configuration loading, validation, and management for SpurChat.
//!
//! Loads configuration from `~/.spurchat/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.spurchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Timeout for a single provider request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat behavior (context window, validation limits, prompt)
    #[serde(default)]
    pub chat: ChatConfig,

    /// Portkey gateway credentials
    #[serde(default)]
    pub portkey: PortkeyConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Set when `default_provider` came from the file or `SPURCHAT_PROVIDER`.
    #[serde(skip)]
    provider_pinned: bool,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout_secs() -> u64 {
    60
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
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("chat", &self.chat)
            .field("portkey", &self.portkey)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl std::fmt::Debug for PortkeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortkeyConfig")
            .field("api_key", &redact(&self.api_key))
            .field("virtual_key", &redact(&self.virtual_key))
            .field("cache", &self.cache)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file (ignored by the memory backend)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    AppConfig::config_dir()
        .join("spurchat.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed CORS origins. Empty = any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Messages per client per minute on `POST /chat/message`. 0 disables.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    /// Maximum request body size
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Key the rate limiter on the first `X-Forwarded-For` hop instead of the
    /// peer address. Enable only behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_rate_limit() -> usize {
    20
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: vec![],
            rate_limit_per_minute: default_rate_limit(),
            body_limit_bytes: default_body_limit(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How many prior messages are sent to the model with each request
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Upper bound on message length, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Title given to newly created conversations
    #[serde(default = "default_conversation_title")]
    pub conversation_title: String,

    /// Replace the built-in Spur Mart system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_history_window() -> usize {
    10
}
fn default_max_message_chars() -> usize {
    2000
}
fn default_conversation_title() -> String {
    "New Chat".into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_message_chars: default_max_message_chars(),
            conversation_title: default_conversation_title(),
            system_prompt_override: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PortkeyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// When unset, requests go to OpenAI with the top-level API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_key: Option<String>,

    /// Enable Portkey's simple response cache
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PortkeyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            virtual_key: None,
            cache: true,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Extra HTTP headers sent with every request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.spurchat/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply process environment overrides.
    ///
    /// - `SPURCHAT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `PORTKEY_API_KEY`, `PORTKEY_VIRTUAL_KEY`
    /// - `SPURCHAT_PROVIDER`, `SPURCHAT_MODEL`, `SPURCHAT_DB_PATH`, `PORT`
    ///
    /// A Portkey key selects the `portkey` provider unless a provider was
    /// named in the file or through `SPURCHAT_PROVIDER`.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.provider_pinned = toml::from_str::<toml::Table>(&content)
            .is_ok_and(|table| table.contains_key("default_provider"));

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `var`, a lookup function.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("SPURCHAT_API_KEY").or_else(|| {
            if self.api_key.is_none() {
                var("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.api_key = Some(key);
        }

        if let Some(key) = var("PORTKEY_API_KEY") {
            self.portkey.api_key = Some(key);
        }
        if let Some(key) = var("PORTKEY_VIRTUAL_KEY") {
            self.portkey.virtual_key = Some(key);
        }

        if let Some(provider) = var("SPURCHAT_PROVIDER") {
            self.default_provider = provider;
            self.provider_pinned = true;
        }

        if !self.provider_pinned && self.portkey.api_key.is_some() {
            tracing::debug!("Portkey key present, routing through portkey");
            self.default_provider = "portkey".into();
        }

        if let Some(model) = var("SPURCHAT_MODEL") {
            self.default_model = model;
        }

        if let Some(path) = var("SPURCHAT_DB_PATH") {
            self.store.path = path;
        }

        if let Some(port) = var("PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".spurchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.chat.history_window == 0 || self.chat.history_window > 100 {
            return Err(ConfigError::ValidationError(
                "chat.history_window must be between 1 and 100".into(),
            ));
        }

        if self.chat.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_message_chars must be > 0".into(),
            ));
        }

        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.port must be non-zero".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected \"sqlite\" or \"memory\")",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available for the default provider.
    pub fn has_api_key(&self) -> bool {
        if self.default_provider == "portkey" {
            return self.portkey.api_key.is_some();
        }
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
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
            request_timeout_secs: default_request_timeout_secs(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            chat: ChatConfig::default(),
            portkey: PortkeyConfig::default(),
            providers: HashMap::new(),
            provider_pinned: false,
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

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.chat.history_window, 10);
        assert_eq!(config.chat.max_message_chars, 2000);
        assert_eq!(config.gateway.rate_limit_per_minute, 20);
        assert!(!config.gateway.trust_forwarded_for);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.chat.conversation_title, "New Chat");
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
    fn zero_history_window_rejected() {
        let mut config = AppConfig::default();
        config.chat.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "postgres".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openai");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o-mini"

[chat]
history_window = 6

[gateway]
port = 8080
allowed_origins = ["http://localhost:5173"]
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.chat.history_window, 6);
        assert_eq!(config.chat.max_message_chars, 2000);
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.allowed_origins.len(), 1);
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn spurchat_api_key_beats_openai_key() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("SPURCHAT_API_KEY", "sk-spur"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-spur"));
    }

    #[test]
    fn openai_key_does_not_override_file_key() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(env(&[("OPENAI_API_KEY", "sk-openai")]));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn env_overrides_provider_model_port_and_store() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("SPURCHAT_PROVIDER", "portkey"),
            ("SPURCHAT_MODEL", "gpt-4o-mini"),
            ("PORT", "4000"),
            ("SPURCHAT_DB_PATH", "/tmp/chat.db"),
            ("PORTKEY_API_KEY", "pk-test"),
        ]));
        assert_eq!(config.default_provider, "portkey");
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.store.path, "/tmp/chat.db");
        assert!(config.has_api_key());
    }

    #[test]
    fn portkey_env_keys_select_portkey() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("PORTKEY_API_KEY", "pk-test"),
            ("PORTKEY_VIRTUAL_KEY", "vk-openai"),
        ]));
        assert_eq!(config.default_provider, "portkey");
        assert_eq!(config.portkey.virtual_key.as_deref(), Some("vk-openai"));
        assert!(config.has_api_key());
    }

    #[test]
    fn portkey_key_from_file_selects_portkey() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[portkey]\napi_key = \"pk-file\"").unwrap();

        let mut config = AppConfig::load_from(file.path()).unwrap();
        config.apply_env_overrides(env(&[]));
        assert_eq!(config.default_provider, "portkey");
    }

    #[test]
    fn explicit_provider_wins_over_portkey_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = \"openai\"").unwrap();

        let mut config = AppConfig::load_from(file.path()).unwrap();
        config.apply_env_overrides(env(&[("PORTKEY_API_KEY", "pk-test")]));
        assert_eq!(config.default_provider, "openai");

        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("PORTKEY_API_KEY", "pk-test"),
            ("SPURCHAT_PROVIDER", "openrouter"),
        ]));
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn invalid_port_env_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("PORT", "not-a-port")]));
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        config.portkey.api_key = Some("pk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("history_window = 10"));
    }
}
