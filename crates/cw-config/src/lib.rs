//! Cloud Webhooks configuration
//!
//! Configuration is assembled from three layers, later layers winning:
//! 1. Built-in defaults
//! 2. An optional TOML file (explicit path or `CW_CONFIG`)
//! 3. Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CW_CONFIG` | - | Path to a TOML config file |
//! | `CW_HOST` | `0.0.0.0` | Bind host |
//! | `CW_PORT` | `8080` | Bind port |
//! | `PARSE_WEBHOOK_KEY` | - | Shared webhook secret (required) |
//! | `CW_LOG_LEVEL` | `info` | Default log directive |
//! | `CW_LOG_FORMAT` | `pretty` | `pretty` or `json` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "CW_CONFIG";
pub const WEBHOOK_KEY_ENV: &str = "PARSE_WEBHOOK_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Webhook key is not configured (set PARSE_WEBHOOK_KEY or webhook.key)")]
    MissingWebhookKey,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Webhook authentication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Shared secret expected in the webhook key header
    pub key: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub webhook: WebhookSettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from the given file (or `CW_CONFIG`) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load using a custom environment lookup
    pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(file) => {
                debug!(path = %file.display(), "Loading configuration file");
                let contents = std::fs::read_to_string(&file).map_err(|source| ConfigError::Io {
                    path: file.clone(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };

        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = env("CW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env("CW_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CW_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(key) = env(WEBHOOK_KEY_ENV) {
            self.webhook.key = Some(key);
        }
        if let Some(level) = env("CW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env("CW_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.webhook_key().map(|_| ())
    }

    /// The configured webhook key; an empty key counts as missing
    pub fn webhook_key(&self) -> Result<&str> {
        match self.webhook.key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingWebhookKey),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
