//! Hierarchical configuration loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid max_workers: {0}. Must be between 1 and 64")]
    InvalidMaxWorkers(usize),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid confidence threshold {0}: must be within 0.0..=1.0")]
    InvalidConfidence(f64),

    #[error("Invalid lease: lease_secs ({lease}) must exceed heartbeat_secs ({heartbeat})")]
    InvalidLease { lease: u64, heartbeat: u64 },

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Loads configuration with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .foreman/config.yaml
    /// 3. .foreman/local.yaml (optional overrides)
    /// 4. Environment variables (FOREMAN_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".foreman/config.yaml"))
            .merge(Yaml::file(".foreman/local.yaml"))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_workers == 0 || config.max_workers > 64 {
            return Err(ConfigError::InvalidMaxWorkers(config.max_workers));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        for threshold in [
            config.engine.auto_approve_confidence,
            config.engine.review_confidence,
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidConfidence(threshold));
            }
        }

        if config.engine.lease_secs <= config.engine.heartbeat_secs {
            return Err(ConfigError::InvalidLease {
                lease: config.engine.lease_secs,
                heartbeat: config.engine.heartbeat_secs,
            });
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ConfigLoader::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = Config::default();
        config.max_workers = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxWorkers(0))
        ));
    }

    #[test]
    fn test_rejects_lease_below_heartbeat() {
        let mut config = Config::default();
        config.engine.lease_secs = config.engine.heartbeat_secs;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLease { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let mut config = Config::default();
        config.engine.auto_approve_confidence = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConfidence(_))
        ));
    }
}
