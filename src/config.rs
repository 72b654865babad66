// Configuration File Support
//
// TOML configuration for the cloud connector with environment variable
// overrides. Loaded from the XDG config directory by default:
// ~/.config/cloud-connector/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CLOUD_CONNECTOR_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Outbound HTTP client configuration
    pub http: HttpConfig,

    /// OAuth2 token cache configuration
    pub token_cache: TokenCacheConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout in seconds for each token or webhook request
    pub timeout_secs: u64,

    /// Proxy address used when the caller supplies none; empty for direct
    pub proxy: String,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            proxy: String::new(),
            user_agent: concat!("cloud-connector/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// OAuth2 token cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TokenCacheConfig {
    /// Stop serving a token once its `expires_in` has elapsed
    pub honor_expiry: bool,

    /// Seconds subtracted from `expires_in` before a token is refreshed
    pub expiry_skew_secs: u64,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            honor_expiry: true,
            expiry_skew_secs: 30,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to write metrics after each CLI dispatch
    pub enabled: bool,

    /// Prometheus textfile path (node exporter textfile collector)
    pub textfile: Option<String>,
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides and validation apply whether or not the file
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/cloud-connector/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "cloud-connector", "cloud-connector") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("cloud-connector").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - CLOUD_CONNECTOR_LOG_LEVEL
    /// - CLOUD_CONNECTOR_LOG_FORMAT
    /// - CLOUD_CONNECTOR_HTTP_TIMEOUT_SECS
    /// - CLOUD_CONNECTOR_PROXY
    /// - CLOUD_CONNECTOR_TOKEN_HONOR_EXPIRY
    /// - CLOUD_CONNECTOR_TOKEN_EXPIRY_SKEW_SECS
    /// - CLOUD_CONNECTOR_METRICS_ENABLED
    /// - CLOUD_CONNECTOR_METRICS_TEXTFILE
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Apply overrides from an arbitrary lookup, keyed without the prefix
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(timeout) = lookup("HTTP_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                if timeout > 0 {
                    self.http.timeout_secs = timeout;
                }
            }
        }
        if let Some(proxy) = lookup("PROXY") {
            self.http.proxy = proxy;
        }

        if let Some(honor) = lookup("TOKEN_HONOR_EXPIRY") {
            self.token_cache.honor_expiry = honor.parse().unwrap_or(self.token_cache.honor_expiry);
        }
        if let Some(skew) = lookup("TOKEN_EXPIRY_SKEW_SECS") {
            if let Ok(skew) = skew.parse::<u64>() {
                self.token_cache.expiry_skew_secs = skew;
            }
        }

        if let Some(enabled) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Some(textfile) = lookup("METRICS_TEXTFILE") {
            self.metrics.textfile = Some(textfile);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        if self.http.timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be > 0 seconds");
        }
        if self.http.user_agent.trim().is_empty() {
            anyhow::bail!("HTTP user agent must not be empty");
        }

        if self.metrics.enabled && self.metrics.textfile.is_none() {
            anyhow::bail!("Metrics are enabled but no textfile path is configured");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.level.to_lowercase().parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
