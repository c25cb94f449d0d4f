use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database url cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid jitter: {0}. Must be within 0.0–1.0")]
    InvalidJitter(f64),

    #[error("Invalid max_retries: {0}. Schedule supports at most 7")]
    InvalidMaxRetries(usize),

    #[error("Invalid instance_count: {0}. Must be at least 1")]
    InvalidInstanceCount(usize),

    #[error("Invalid probe_operations: {0}. Must be at least 1")]
    InvalidProbeOperations(u32),

    #[error("Invalid field_test_days: {0}. Must be at least 1")]
    InvalidFieldTestDays(i64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .swarmlord/config.yaml (project config)
    /// 3. .swarmlord/local.yaml (local overrides, optional)
    /// 4. Environment variables (`SWARMLORD_`* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".swarmlord/config.yaml"))
            .merge(Yaml::file(".swarmlord/local.yaml"))
            .merge(Env::prefixed("SWARMLORD_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
        if config.database.url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }
        if !(0.0..=1.0).contains(&config.retry.jitter) {
            return Err(ConfigError::InvalidJitter(config.retry.jitter));
        }
        if config.retry.max_retries > 7 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }
        if config.deployment.instance_count == 0 {
            return Err(ConfigError::InvalidInstanceCount(
                config.deployment.instance_count,
            ));
        }
        if config.improvement.probe_operations == 0 {
            return Err(ConfigError::InvalidProbeOperations(
                config.improvement.probe_operations,
            ));
        }
        if config.improvement.field_test_days < 1 {
            return Err(ConfigError::InvalidFieldTestDays(
                config.improvement.field_test_days,
            ));
        }
        Ok(())
    }
}
