use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Data root cannot be empty")]
    EmptyDataRoot,

    #[error("Storage root cannot be empty")]
    EmptyStorageRoot,

    #[error("Invalid check_interval_ms: {0}. Must be at least 1")]
    InvalidCheckInterval(u64),

    #[error("Invalid job_timeout_secs: {0}. Must be at least 1")]
    InvalidJobTimeout(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The given YAML file
    /// 3. Environment variables (SHEPHERD_* prefix, `__` separates nested keys)
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("SHEPHERD_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment overrides)
    pub fn load_from_str(yaml: &str) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .context("Failed to parse configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Sheep definitions are validated by the registry when it builds
    /// the sheep, so that errors name the offending sheep.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.data_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataRoot);
        }

        if config.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStorageRoot);
        }

        if config.health.check_interval_ms == 0 {
            return Err(ConfigError::InvalidCheckInterval(
                config.health.check_interval_ms,
            ));
        }

        if let Some(0) = config.health.job_timeout_secs {
            return Err(ConfigError::InvalidJobTimeout(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
