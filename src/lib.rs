//! Swarmlord - Agent Orchestration Substrate
//!
//! Coordinates a population of autonomous agents under hard economic
//! constraints:
//! - Survival tiers gating capabilities by balance
//! - Swarm coordination over dependency-ordered subtask DAGs
//! - Durable, subscribable shared memory (SQLite)
//! - A recursive self-improvement pipeline with a capability gate
//! - Zero-downtime deployments (blue-green, rolling, canary)
//! - Fibonacci-backoff retries under every external I/O

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{tier_of, Agent, ComplexTask, SurvivalTier};
pub use infrastructure::{Config, ConfigLoader};
pub use services::{DeploymentController, FibonacciRetry, SwarmCoordinator};
