//! Configuration for alias sessions and the follow registry
//!
//! Defaults match the hub's acceptance rules (30-day validity window, 500
//! records per load). Values can be overridden from the environment
//! (`SPACEALIAS_<SECTION>_<KEY>`) or loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },

    #[error("Failed to write configuration file {path}: {reason}")]
    FileWrite { path: PathBuf, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Alias key storage and validity
    #[serde(default)]
    pub alias: AliasConfig,

    /// Follow registry behaviour
    #[serde(default)]
    pub follow: FollowConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Alias configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasConfig {
    /// How long after creation the hub accepts an alias binding.
    /// This is the server's acceptance window, not a client cache TTL.
    #[serde(with = "humantime_serde")]
    pub validity_window: Duration,

    /// Directory of the file-backed alias store
    pub data_dir: PathBuf,
}

/// What the follow registry does with a caught error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log only
    #[default]
    LogOnly,
    /// Log and send a generic failure notification
    Notify,
}

/// Follow registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Records fetched when loading the user's follows
    pub load_limit: u32,

    /// Records fetched when loading a space's followers
    pub followers_limit: u32,

    /// Registrations attempted by one `follow` call before giving up
    pub max_registration_retries: u32,

    pub error_policy: ErrorPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            validity_window: Duration::from_secs(30 * 24 * 60 * 60),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            load_limit: 500,
            followers_limit: 500,
            max_registration_retries: 1,
            error_policy: ErrorPolicy::LogOnly,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { key, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults
    ///
    /// Example: `SPACEALIAS_FOLLOW_LOAD_LIMIT=100`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(secs) = parse_env::<u64>("SPACEALIAS_ALIAS_VALIDITY_WINDOW_SECS")? {
            self.alias.validity_window = Duration::from_secs(secs);
        }
        if let Ok(dir) = env::var("SPACEALIAS_ALIAS_DATA_DIR") {
            self.alias.data_dir = PathBuf::from(dir);
        }

        if let Some(limit) = parse_env("SPACEALIAS_FOLLOW_LOAD_LIMIT")? {
            self.follow.load_limit = limit;
        }
        if let Some(limit) = parse_env("SPACEALIAS_FOLLOW_FOLLOWERS_LIMIT")? {
            self.follow.followers_limit = limit;
        }
        if let Some(retries) = parse_env("SPACEALIAS_FOLLOW_MAX_REGISTRATION_RETRIES")? {
            self.follow.max_registration_retries = retries;
        }
        if let Ok(policy) = env::var("SPACEALIAS_FOLLOW_ERROR_POLICY") {
            self.follow.error_policy = match policy.as_str() {
                "log_only" => ErrorPolicy::LogOnly,
                "notify" => ErrorPolicy::Notify,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "SPACEALIAS_FOLLOW_ERROR_POLICY",
                        reason: format!("unknown policy '{}'", other),
                    })
                }
            };
        }

        if let Ok(level) = env::var("SPACEALIAS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("SPACEALIAS_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alias.validity_window.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "validity_window must be greater than 0".to_string(),
            ));
        }

        if self.follow.load_limit == 0 || self.follow.followers_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "load limits must be greater than 0".to_string(),
            ));
        }

        if self.follow.max_registration_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_registration_retries must be at least 1".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}
