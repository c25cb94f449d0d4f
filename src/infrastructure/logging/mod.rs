//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber: env-filter
//! levels, json or pretty output, optional daily-rotated file output.

use anyhow::{bail, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::config::LoggingConfig;

/// Initialise the global subscriber. The returned guard must be held
/// for the process lifetime when file output is enabled.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        other => bail!("invalid log level: {other}"),
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let json = config.format.to_lowercase() == "json";

    if let Some(log_dir) = &config.log_dir {
        let appender = rolling::daily(log_dir, "swarmlord.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        let stdout_layer = if json {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .try_init()?;
        Ok(Some(guard))
    } else {
        let stdout_layer = if json {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .try_init()?;
        Ok(None)
    }
}
