//! Application services for the orchestration substrate.

pub mod assignment;
pub mod decomposition;
pub mod deployment;
pub mod failover;
pub mod improvement;
pub mod memory_daemon;
pub mod retry;
pub mod swarm;
pub mod velocity;

pub use assignment::{
    assign_role, assign_subtasks, rebalance, suitability, AssignmentReport, AssignmentStrategy,
    RebalanceMove, PREFERRED_ROLE_THRESHOLD,
};
pub use decomposition::{decompose, role_hint_for};
pub use deployment::{AlwaysHealthy, DeploymentController, HealthProbe, RequestTracker};
pub use failover::{FailoverEvent, ModelFailover, ModelProfile, UNAVAILABILITY_HOLD};
pub use improvement::{
    ImprovementPipeline, ImprovementSandbox, PipelineConfig, PipelineOutcome, ProbeSample,
    ProductionApplier, SandboxReport, SuccessReport, TelemetrySource, SUCCESS_FITNESS_RISE,
};
pub use memory_daemon::{spawn_cleanup_daemon, CleanupDaemonConfig};
pub use retry::{
    AttemptRecord, CancelSignal, FibonacciRetry, RetryOutcome, FIB_SCHEDULE, MAX_RETRIES,
};
pub use swarm::{
    ConflictResolution, ExecutionMode, InferenceSubtaskRunner, SubtaskRunner, SwarmConfig,
    SwarmCoordinator, SwarmResult, SynthesisStrategy,
};
pub use velocity::VelocityTracker;
