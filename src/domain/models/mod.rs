//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure
//! concerns.

pub mod agent;
pub mod dag;
pub mod deployment;
pub mod improvement;
pub mod memory;
pub mod role;
pub mod task;
pub mod tier;
pub mod velocity;

pub use agent::{Agent, AgentFitness, AgentTraits, LivenessState, VitalityBand};
pub use dag::{SubtaskDag, TopoOrder};
pub use deployment::{
    DeploymentConfig, DeploymentEvent, DeploymentResult, DeploymentStats, DeploymentStatus,
    DeploymentStrategy, InstanceStatus, ServiceInstance,
};
pub use improvement::{
    AppliedModification, ConfigChange, DailySample, FitnessSnapshot, ImpactMeasurement,
    ImprovementOpportunity, ImprovementProposal, OpportunityCategory, PeriodMetrics,
    ProposalKind, ProposalStatus, RoiProjection, RollbackPlan, RollbackStep, TargetMetric,
    RELIABILITY_GUARD_PP,
};
pub use memory::{
    ChangeEvent, ChangeKind, MemoryEntry, MemoryMetadata, MemoryOrderBy, MemoryPriority,
    MemoryQuery, OrderDir, SubscriptionFilter,
};
pub use role::{AgentRole, RoleProfile, ROLE_ORDER};
pub use task::{CollaborationRecord, ComplexTask, SubTask, SubTaskStatus};
pub use tier::{tier_of, tier_transition, SurvivalTier, TierDirection, TierTransition, TIER_ORDER};
pub use velocity::{
    AlertSeverity, ImpactSample, VelocityAlert, VelocityMeasurement, VelocityTrend,
    VelocityWindow, ACCELERATION_THRESHOLD, CAPABILITY_GATE_PCT_PER_DAY,
};
