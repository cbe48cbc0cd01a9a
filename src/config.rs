//! Configuration management
//!
//! Gateway configuration is read from a TOML file and then overridden by the
//! environment variables the gateway has always honoured (`OLLAMA_URL`,
//! `DEEPSEEK_API_KEY`, `API_KEYS`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::BackendDescriptor;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Local inference backend
    #[serde(default)]
    pub local: LocalConfig,
    /// Remote inference backend
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Routing policy
    #[serde(default)]
    pub routing: RoutingConfig,
    /// API keys and rate limiting
    #[serde(default)]
    pub access: AccessConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Name reported as `owned_by` for local models
    #[serde(default = "default_local_name")]
    pub name: String,
    #[serde(default = "default_local_url")]
    pub base_url: String,
    /// Inference call timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Model inventory probe timeout (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_local_name() -> String {
    "local".to_string()
}

fn default_local_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            name: default_local_name(),
            base_url: default_local_url(),
            timeout_secs: default_request_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Requested model names containing `token` are served by `model` remotely
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVariant {
    pub token: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,
    /// API root; `/chat/completions` is appended
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    /// Bearer token (usually supplied through `DEEPSEEK_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Model used when no variant matches
    #[serde(default = "default_remote_model")]
    pub default_model: String,
    #[serde(default = "default_variants")]
    pub variants: Vec<ModelVariant>,
    /// Static list advertised by `/v1/models`
    #[serde(default = "default_remote_models")]
    pub models: Vec<String>,
}

fn default_remote_name() -> String {
    "deepseek".to_string()
}

fn default_remote_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_remote_model() -> String {
    "deepseek-chat".to_string()
}

fn default_variants() -> Vec<ModelVariant> {
    vec![ModelVariant {
        token: "coder".to_string(),
        model: "deepseek-coder".to_string(),
    }]
}

fn default_remote_models() -> Vec<String> {
    vec![
        "deepseek-chat".to_string(),
        "deepseek-coder".to_string(),
        "deepseek-reasoner".to_string(),
    ]
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: default_remote_name(),
            base_url: default_remote_url(),
            api_key: None,
            timeout_secs: default_request_timeout(),
            default_model: default_remote_model(),
            variants: default_variants(),
            models: default_remote_models(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Total message characters above which a request goes remote
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: usize,
    /// Model-name tokens that always route remote (case-insensitive)
    #[serde(default = "default_remote_tokens")]
    pub remote_tokens: Vec<String>,
}

fn default_complexity_threshold() -> usize {
    500
}

fn default_remote_tokens() -> Vec<String> {
    vec!["deepseek".to_string(), "reasoner".to_string(), "coder".to_string()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
            remote_tokens: default_remote_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Static keys that are always accepted
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Administrator key, always accepted
    #[serde(default)]
    pub admin_key: Option<String>,
    /// Persisted key records (defaults to the data directory)
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    /// Requests per window for keys without their own limit
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window() -> u64 {
    60
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            admin_key: None,
            keys_file: None,
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to `path` (or the default location)
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        Ok(config_path)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port.parse().context("PORT must be a port number")?;
        }
        if let Some(url) = get("OLLAMA_URL") {
            self.local.base_url = url;
        }
        if let Some(url) = get("DEEPSEEK_URL") {
            // Older deployments set the full endpoint rather than the API root
            self.remote.base_url = url
                .trim_end_matches('/')
                .trim_end_matches("/chat/completions")
                .to_string();
        }
        if let Some(key) = get("DEEPSEEK_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(keys) = get("API_KEYS") {
            self.access.api_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(key) = get("ADMIN_API_KEY") {
            self.access.admin_key = Some(key);
        }
        if let Some(n) = get("RATE_LIMIT_REQUESTS") {
            self.access.rate_limit_requests = n.parse().context("RATE_LIMIT_REQUESTS must be an integer")?;
        }
        if let Some(n) = get("RATE_LIMIT_WINDOW") {
            self.access.rate_limit_window_secs = n.parse().context("RATE_LIMIT_WINDOW must be an integer")?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(format) = get("LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }
        Ok(())
    }

    pub fn local_descriptor(&self) -> BackendDescriptor {
        BackendDescriptor::new(
            &self.local.name,
            &self.local.base_url,
            Duration::from_secs(self.local.timeout_secs),
        )
    }

    pub fn remote_descriptor(&self) -> BackendDescriptor {
        BackendDescriptor::new(
            &self.remote.name,
            &self.remote.base_url,
            Duration::from_secs(self.remote.timeout_secs),
        )
        .with_auth_token(self.remote.api_key.clone())
    }

    /// Key store location, defaulting to the data directory
    pub fn keys_file(&self) -> Result<PathBuf> {
        match &self.access.keys_file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("api_keys.json")),
        }
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |s: &String| format!("{}...", crate::truncate_safe(s, 6));
        copy.remote.api_key = copy.remote.api_key.as_ref().map(mask);
        copy.access.admin_key = copy.access.admin_key.as_ref().map(mask);
        copy.access.api_keys = copy.access.api_keys.iter().map(mask).collect();
        copy
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "inference-gateway", "inference-gateway")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "inference-gateway", "inference-gateway")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(&config.redacted()).context("Failed to serialize config")?;
    println!("{}", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.local.base_url, "http://localhost:11434");
        assert_eq!(config.local.timeout_secs, 120);
        assert_eq!(config.local.probe_timeout_secs, 5);
        assert_eq!(config.routing.complexity_threshold, 500);
        assert_eq!(config.routing.remote_tokens, vec!["deepseek", "reasoner", "coder"]);
        assert_eq!(config.access.rate_limit_requests, 100);
        assert_eq!(config.access.rate_limit_window_secs, 60);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [routing]
            complexity_threshold = 1000

            [remote]
            api_key = "sk-test"
            "#,
        )
        .unwrap();
        assert_eq!(config.routing.complexity_threshold, 1000);
        assert_eq!(config.routing.remote_tokens.len(), 3);
        assert_eq!(config.remote.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.remote.default_model, "deepseek-chat");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("OLLAMA_URL", "http://gpu-box:11434"),
            ("DEEPSEEK_URL", "https://api.deepseek.com/chat/completions"),
            ("DEEPSEEK_API_KEY", "sk-remote"),
            ("API_KEYS", "a, b,,c"),
            ("RATE_LIMIT_REQUESTS", "10"),
            ("LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.local.base_url, "http://gpu-box:11434");
        assert_eq!(config.remote.base_url, "https://api.deepseek.com");
        assert_eq!(config.remote.api_key.as_deref(), Some("sk-remote"));
        assert_eq!(config.access.api_keys, vec!["a", "b", "c"]);
        assert_eq!(config.access.rate_limit_requests, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "PORT").then(|| "not-a-port".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.routing.complexity_threshold = 42;
        config.save(Some(&path)).unwrap();

        let loaded: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.routing.complexity_threshold, 42);
    }

    #[test]
    fn test_descriptors_and_redaction() {
        let mut config = Config::default();
        config.remote.api_key = Some("sk-secret-value".into());
        let remote = config.remote_descriptor();
        assert_eq!(remote.auth_token.as_deref(), Some("sk-secret-value"));
        assert_eq!(remote.request_timeout, Duration::from_secs(120));
        assert_eq!(config.local_descriptor().name, "local");
        assert_eq!(config.redacted().remote.api_key.as_deref(), Some("sk-sec..."));
    }
}
