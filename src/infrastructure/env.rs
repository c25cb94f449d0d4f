//! Process environment provider.
//!
//! Reads the real process environment behind the `EnvProvider` port.
//! Privileged keys (the master key and salt) are only readable by
//! callers holding the secrets capability token; authorisation is a
//! token set, not process identity.

use std::collections::HashSet;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::EnvProvider;

/// Master encryption key variable.
pub const MASTER_KEY_VAR: &str = "SWARMLORD_MASTER_KEY";
/// Key-derivation salt variable.
pub const SALT_VAR: &str = "SWARMLORD_SALT";

/// Capability token that unlocks privileged reads.
pub const SECRETS_CAPABILITY: &str = "env:secrets";

/// Keys every deployment must provide.
pub const REQUIRED_KEYS: [&str; 2] = [MASTER_KEY_VAR, SALT_VAR];

pub struct ProcessEnvProvider {
    capabilities: HashSet<String>,
}

impl Default for ProcessEnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnvProvider {
    /// Provider with no capabilities; privileged keys are refused.
    pub fn new() -> Self {
        Self {
            capabilities: HashSet::new(),
        }
    }

    /// Grant a capability token.
    pub fn with_capability(mut self, token: impl Into<String>) -> Self {
        self.capabilities.insert(token.into());
        self
    }

    fn is_privileged(key: &str) -> bool {
        key == MASTER_KEY_VAR || key == SALT_VAR
    }

    fn authorise(&self, key: &str) -> DomainResult<()> {
        if Self::is_privileged(key) && !self.capabilities.contains(SECRETS_CAPABILITY) {
            return Err(DomainError::PreconditionFailed(format!(
                "reading {key} requires the {SECRETS_CAPABILITY} capability"
            )));
        }
        Ok(())
    }
}

impl EnvProvider for ProcessEnvProvider {
    fn get(&self, key: &str) -> DomainResult<String> {
        self.authorise(key)?;
        std::env::var(key)
            .map_err(|_| DomainError::Environment(format!("missing environment key: {key}")))
    }

    fn get_optional(&self, key: &str) -> Option<String> {
        if self.authorise(key).is_err() {
            return None;
        }
        std::env::var(key).ok()
    }

    fn has(&self, key: &str) -> bool {
        // Presence checks do not reveal values and need no capability.
        std::env::var(key).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_keys_require_capability() {
        std::env::set_var(MASTER_KEY_VAR, "k");
        let locked = ProcessEnvProvider::new();
        assert!(matches!(
            locked.get(MASTER_KEY_VAR),
            Err(DomainError::PreconditionFailed(_))
        ));
        assert!(locked.get_optional(MASTER_KEY_VAR).is_none());

        let granted = ProcessEnvProvider::new().with_capability(SECRETS_CAPABILITY);
        assert_eq!(granted.get(MASTER_KEY_VAR).unwrap(), "k");
        std::env::remove_var(MASTER_KEY_VAR);
    }

    #[test]
    fn typed_getters_parse() {
        std::env::set_var("SWARMLORD_TEST_FLAG", "yes");
        std::env::set_var("SWARMLORD_TEST_NUM", "2.5");
        let provider = ProcessEnvProvider::new();
        assert!(provider.get_boolean("SWARMLORD_TEST_FLAG").unwrap());
        assert!((provider.get_number("SWARMLORD_TEST_NUM").unwrap() - 2.5).abs() < f64::EPSILON);
        std::env::remove_var("SWARMLORD_TEST_FLAG");
        std::env::remove_var("SWARMLORD_TEST_NUM");
    }

    #[test]
    fn validate_reports_missing_keys() {
        let provider = ProcessEnvProvider::new();
        let err = provider
            .validate(&["SWARMLORD_DEFINITELY_MISSING"])
            .unwrap_err();
        assert!(err.to_string().contains("SWARMLORD_DEFINITELY_MISSING"));
    }
}
