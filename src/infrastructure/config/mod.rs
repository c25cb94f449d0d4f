//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Validated defaults per subsystem

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};

/// Main configuration structure for the substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry engine configuration
    #[serde(default)]
    pub retry: RetrySettings,

    /// Swarm coordinator configuration
    #[serde(default)]
    pub swarm: SwarmSettings,

    /// Deployment controller configuration
    #[serde(default)]
    pub deployment: DeploymentSettings,

    /// Self-improvement pipeline configuration
    #[serde(default)]
    pub improvement: ImprovementSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            retry: RetrySettings::default(),
            swarm: SwarmSettings::default(),
            deployment: DeploymentSettings::default(),
            improvement: ImprovementSettings::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite:.swarmlord/swarmlord.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for daily-rotated log files
    #[serde(default)]
    pub log_dir: Option<String>,
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
            log_dir: None,
        }
    }
}

/// Retry engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrySettings {
    /// Base backoff interval in milliseconds
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    /// Jitter fraction applied to each delay (0.0–1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Retries beyond the first attempt (at most 7)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

const fn default_base_interval_ms() -> u64 {
    1_000
}

const fn default_jitter() -> f64 {
    0.10
}

const fn default_max_retries() -> usize {
    7
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            jitter: default_jitter(),
            max_retries: default_max_retries(),
        }
    }
}

/// Swarm coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmSettings {
    /// Whole-run budget in seconds
    #[serde(default = "default_global_timeout_secs")]
    pub global_timeout_secs: u64,

    /// Additional attempts per subtask
    #[serde(default = "default_subtask_retries")]
    pub subtask_retries: u32,

    /// Fixed delay between subtask attempts, milliseconds
    #[serde(default = "default_subtask_retry_delay_ms")]
    pub subtask_retry_delay_ms: u64,

    /// Scheduling tick floor, milliseconds
    #[serde(default = "default_tick_debounce_ms")]
    pub tick_debounce_ms: u64,

    /// Run ready subtasks concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

const fn default_global_timeout_secs() -> u64 {
    300
}

const fn default_subtask_retries() -> u32 {
    3
}

const fn default_subtask_retry_delay_ms() -> u64 {
    1_000
}

const fn default_tick_debounce_ms() -> u64 {
    100
}

const fn default_parallel() -> bool {
    true
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            global_timeout_secs: default_global_timeout_secs(),
            subtask_retries: default_subtask_retries(),
            subtask_retry_delay_ms: default_subtask_retry_delay_ms(),
            tick_debounce_ms: default_tick_debounce_ms(),
            parallel: default_parallel(),
        }
    }
}

/// Deployment controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeploymentSettings {
    #[serde(default = "default_instance_count")]
    pub instance_count: usize,

    #[serde(default = "default_health_check_retries")]
    pub health_check_retries: u32,

    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_traffic_shift_delay_ms")]
    pub traffic_shift_delay_ms: u64,

    #[serde(default = "default_canary_monitor_ms")]
    pub canary_monitor_ms: u64,

    #[serde(default = "default_rollback_on_failure")]
    pub rollback_on_failure: bool,
}

const fn default_instance_count() -> usize {
    2
}

const fn default_health_check_retries() -> u32 {
    3
}

const fn default_health_check_interval_ms() -> u64 {
    2_000
}

const fn default_traffic_shift_delay_ms() -> u64 {
    1_000
}

const fn default_canary_monitor_ms() -> u64 {
    30_000
}

const fn default_rollback_on_failure() -> bool {
    true
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            instance_count: default_instance_count(),
            health_check_retries: default_health_check_retries(),
            health_check_interval_ms: default_health_check_interval_ms(),
            traffic_shift_delay_ms: default_traffic_shift_delay_ms(),
            canary_monitor_ms: default_canary_monitor_ms(),
            rollback_on_failure: default_rollback_on_failure(),
        }
    }
}

/// Self-improvement pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImprovementSettings {
    /// Probe operations per sandbox run
    #[serde(default = "default_probe_operations")]
    pub probe_operations: u32,

    /// Field-test window length in days
    #[serde(default = "default_field_test_days")]
    pub field_test_days: i64,
}

const fn default_probe_operations() -> u32 {
    100
}

const fn default_field_test_days() -> i64 {
    7
}

impl Default for ImprovementSettings {
    fn default() -> Self {
        Self {
            probe_operations: default_probe_operations(),
            field_test_days: default_field_test_days(),
        }
    }
}

impl Config {
    /// Retry engine built from these settings.
    pub fn retry_engine(&self) -> crate::services::FibonacciRetry {
        crate::services::FibonacciRetry::new(
            std::time::Duration::from_millis(self.retry.base_interval_ms),
            self.retry.jitter,
            self.retry.max_retries,
        )
    }

    /// Swarm coordinator config built from these settings.
    pub fn swarm_config(&self) -> crate::services::SwarmConfig {
        crate::services::SwarmConfig {
            execution_mode: if self.swarm.parallel {
                crate::services::ExecutionMode::Parallel
            } else {
                crate::services::ExecutionMode::Sequential
            },
            max_retries: self.swarm.subtask_retries,
            retry_delay: std::time::Duration::from_millis(self.swarm.subtask_retry_delay_ms),
            global_timeout: std::time::Duration::from_secs(self.swarm.global_timeout_secs),
            tick_debounce: std::time::Duration::from_millis(self.swarm.tick_debounce_ms),
            ..crate::services::SwarmConfig::default()
        }
    }

    /// Deployment controller config built from these settings.
    pub fn deployment_config(&self) -> crate::domain::models::DeploymentConfig {
        crate::domain::models::DeploymentConfig {
            instance_count: self.deployment.instance_count,
            health_check_retries: self.deployment.health_check_retries,
            health_check_interval_ms: self.deployment.health_check_interval_ms,
            traffic_shift_delay_ms: self.deployment.traffic_shift_delay_ms,
            canary_monitor_ms: self.deployment.canary_monitor_ms,
            rollback_on_failure: self.deployment.rollback_on_failure,
        }
    }

    /// Pipeline config built from these settings.
    pub fn pipeline_config(&self) -> crate::services::PipelineConfig {
        crate::services::PipelineConfig {
            probe_operations: self.improvement.probe_operations,
            field_test_days: self.improvement.field_test_days,
        }
    }
}
