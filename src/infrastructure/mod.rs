//! Infrastructure layer
//!
//! Process-wide concerns behind the domain ports: configuration,
//! logging, and environment access.

pub mod config;
pub mod env;
pub mod logging;

pub use config::{Config, ConfigError, ConfigLoader};
pub use env::{ProcessEnvProvider, REQUIRED_KEYS, SECRETS_CAPABILITY};
