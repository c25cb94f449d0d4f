//! Domain errors for the swarmlord orchestration substrate.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Memory entry not found: {0}")]
    MemoryNotFound(Uuid),

    #[error("Subtask not found: {0}")]
    SubtaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Dependency cycle detected involving subtask: {0}")]
    DependencyCycle(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Degraded: {0}")]
    Degraded(String),

    #[error("Retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} ms")]
    TimedOut(u64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Environment error: {0}")]
    Environment(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is worth retrying through the backoff engine.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Database(_) | Self::TimedOut(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(DomainError::Transient("socket reset".into()).is_transient());
        assert!(DomainError::TimedOut(5000).is_transient());
        assert!(!DomainError::PreconditionFailed("closed".into()).is_transient());
        assert!(!DomainError::Cancelled.is_transient());
    }
}
