//! Environment provider port.
//!
//! The core never reads the process environment directly; it goes
//! through this injected provider. Authorisation for privileged reads is
//! a capability token set, not process identity.

use crate::domain::errors::{DomainError, DomainResult};

/// Injected environment/secret access.
pub trait EnvProvider: Send + Sync {
    /// Required value; errors when absent.
    fn get(&self, key: &str) -> DomainResult<String>;

    /// Optional value.
    fn get_optional(&self, key: &str) -> Option<String>;

    fn has(&self, key: &str) -> bool {
        self.get_optional(key).is_some()
    }

    /// Boolean parse of an optional value; accepts true/false/1/0/yes/no.
    fn get_boolean(&self, key: &str) -> DomainResult<bool> {
        let raw = self.get(key)?;
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(DomainError::Environment(format!(
                "{key} is not a boolean: {other}"
            ))),
        }
    }

    /// Numeric parse of a required value.
    fn get_number(&self, key: &str) -> DomainResult<f64> {
        let raw = self.get(key)?;
        raw.parse().map_err(|_| {
            DomainError::Environment(format!("{key} is not a number: {raw}"))
        })
    }

    /// Verify every required key is present; reports all missing keys.
    fn validate(&self, required: &[&str]) -> DomainResult<()> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| !self.has(key))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Environment(format!(
                "missing required environment keys: {}",
                missing.join(", ")
            )))
        }
    }
}
