//! Deployment domain model.
//!
//! Types for the zero-downtime deployment controller: service
//! instances, strategy and status machines, the observable event
//! stream, and the result contract (zero failed requests for success).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Starting,
    Healthy,
    Unhealthy,
    Stopping,
    Stopped,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// One running copy of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: Uuid,
    pub version: String,
    pub status: InstanceStatus,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn start(version: impl Into<String>, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: version.into(),
            status: InstanceStatus::Starting,
            port,
            started_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == InstanceStatus::Healthy
    }
}

/// Cut-over strategy for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStrategy {
    /// Start a full new fleet, flip traffic atomically, stop the old.
    BlueGreen,
    /// Replace instances one at a time with gradual traffic shifts.
    Rolling,
    /// One canary at 10% traffic under a monitor, then blue-green.
    Canary,
}

impl DeploymentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlueGreen => "blue-green",
            Self::Rolling => "rolling",
            Self::Canary => "canary",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blue-green" | "blue_green" | "bluegreen" => Some(Self::BlueGreen),
            "rolling" => Some(Self::Rolling),
            "canary" => Some(Self::Canary),
            _ => None,
        }
    }
}

/// State of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    HealthCheck,
    TrafficShift,
    Completed,
    Failed,
    /// Reserved for rollbacks performed after completion.
    RolledBack,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::HealthCheck => "health_check",
            Self::TrafficShift => "traffic_shift",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

/// Tunables for the deployment controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Target instance count for blue-green fleets.
    pub instance_count: usize,
    /// Health check attempts per instance before declaring it unhealthy.
    pub health_check_retries: u32,
    /// Fixed delay between health check attempts.
    pub health_check_interval_ms: u64,
    /// Delay between gradual traffic shift steps.
    pub traffic_shift_delay_ms: u64,
    /// Canary observation period before continuing the rollout.
    pub canary_monitor_ms: u64,
    /// Whether a failed deployment restores the previous fleet.
    pub rollback_on_failure: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            instance_count: 2,
            health_check_retries: 3,
            health_check_interval_ms: 2_000,
            traffic_shift_delay_ms: 1_000,
            canary_monitor_ms: 30_000,
            rollback_on_failure: true,
        }
    }
}

/// Observable event on the deployment stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeploymentEvent {
    DeploymentStarted { id: Uuid, version: String },
    DeploymentStrategy { id: Uuid, strategy: DeploymentStrategy },
    DeploymentStatus { id: Uuid, status: DeploymentStatus },
    DeploymentCompleted { id: Uuid, version: String, duration_ms: u64 },
    DeploymentFailed { id: Uuid, error: String },
    RollbackStarted { id: Uuid },
    RollbackCompleted { id: Uuid },
    InstanceStarting { instance_id: Uuid, version: String, port: u16 },
    InstanceStarted { instance_id: Uuid, version: String },
    InstanceStopping { instance_id: Uuid },
    InstanceStopped { instance_id: Uuid },
    HealthCheckAttempt { instance_id: Uuid, attempt: u32 },
    HealthCheckSuccess { instance_id: Uuid },
    HealthCheckFailed { instance_id: Uuid, attempts: u32 },
    TrafficSwitching { from_version: Option<String>, to_version: String },
    TrafficSwitched { version: String },
    TrafficShifting { version: String },
    TrafficPercentage { version: String, percent: u8 },
}

/// Outcome of one deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub final_status: DeploymentStatus,
    /// Must be 0 for a successful zero-downtime deployment.
    pub failed_requests: u64,
    pub total_requests: u64,
    pub deployment_time_ms: u64,
    pub error: Option<String>,
}

/// Aggregate over all deployments a controller has run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeploymentStats {
    pub total: u64,
    pub failed: u64,
    /// Percent of successful deployments; 100 when none have run.
    pub success_rate: f64,
}

impl DeploymentStats {
    pub fn compute(total: u64, failed: u64) -> Self {
        let success_rate = if total == 0 {
            100.0
        } else {
            (total - failed) as f64 / total as f64 * 100.0
        };
        Self {
            total,
            failed,
            success_rate,
        }
    }
}
