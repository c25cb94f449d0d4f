//! Recursive self-improvement pipeline.
//!
//! Mines an opportunity into a proposal, tests it in a sandbox, measures
//! impact over a 7-day field window, and applies only validated
//! proposals to production with an explicit rollback plan. The mutation
//! surface is pluggable behind a single apply-change capability.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AppliedModification, ConfigChange, DailySample, FitnessSnapshot, ImpactMeasurement,
    ImprovementOpportunity, ImprovementProposal, PeriodMetrics, ProposalStatus, RoiProjection,
    RollbackPlan, VelocityWindow,
};

/// Minimum relative fitness rise over the observation window for an
/// applied improvement to count as a success.
pub const SUCCESS_FITNESS_RISE: f64 = 0.05;

/// One probe observation from the sandbox.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSample {
    pub latency_ms: f64,
    pub cost: f64,
    pub success: bool,
}

/// Aggregate of a sandbox run.
#[derive(Debug, Clone, Default)]
pub struct SandboxReport {
    pub operations: u32,
    pub successes: u32,
    pub failures: u32,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    pub total_cost: f64,
    pub errors: Vec<String>,
}

impl SandboxReport {
    pub fn success_rate(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.operations)
        }
    }
}

/// Isolated environment a proposal is exercised in before it may touch
/// production.
#[async_trait]
pub trait ImprovementSandbox: Send + Sync {
    /// Clone the agent's configuration for isolated testing.
    async fn snapshot(&self, agent_id: Uuid) -> DomainResult<HashMap<String, Value>>;

    /// Concrete changes the proposal makes against a snapshot.
    fn plan_changes(
        &self,
        proposal: &ImprovementProposal,
        snapshot: &HashMap<String, Value>,
    ) -> Vec<ConfigChange>;

    /// Run one probe operation with the proposal applied.
    async fn probe(&self, proposal: &ImprovementProposal, index: u32) -> DomainResult<ProbeSample>;
}

/// The single capability through which validated changes reach
/// production.
#[async_trait]
pub trait ProductionApplier: Send + Sync {
    async fn apply_change(&self, agent_id: Uuid, change: &ConfigChange) -> DomainResult<()>;

    /// Invert one change; used when a partial apply must unwind.
    async fn revert_change(&self, agent_id: Uuid, change: &ConfigChange) -> DomainResult<()>;
}

/// Historical execution telemetry the pipeline measures against.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn period_metrics(
        &self,
        agent_id: Uuid,
        window: VelocityWindow,
    ) -> DomainResult<PeriodMetrics>;

    async fn daily_samples(
        &self,
        agent_id: Uuid,
        window: VelocityWindow,
    ) -> DomainResult<Vec<DailySample>>;

    async fn fitness_snapshot(&self, agent_id: Uuid) -> DomainResult<FitnessSnapshot>;

    async fn operations_per_day(&self, agent_id: Uuid) -> DomainResult<f64>;
}

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Probe operations per sandbox run.
    pub probe_operations: u32,
    /// Field-test window length.
    pub field_test_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            probe_operations: 100,
            field_test_days: 7,
        }
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub proposal: ImprovementProposal,
    pub sandbox: SandboxReport,
    pub impact: Option<ImpactMeasurement>,
    pub applied: Option<AppliedModification>,
}

/// Result of post-apply success tracking.
#[derive(Debug, Clone, Copy)]
pub struct SuccessReport {
    pub before: FitnessSnapshot,
    pub after: FitnessSnapshot,
    pub fitness_change: f64,
    pub success: bool,
}

pub struct ImprovementPipeline {
    sandbox: Arc<dyn ImprovementSandbox>,
    applier: Arc<dyn ProductionApplier>,
    telemetry: Arc<dyn TelemetrySource>,
    config: PipelineConfig,
}

impl ImprovementPipeline {
    pub fn new(
        sandbox: Arc<dyn ImprovementSandbox>,
        applier: Arc<dyn ProductionApplier>,
        telemetry: Arc<dyn TelemetrySource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sandbox,
            applier,
            telemetry,
            config,
        }
    }

    /// Full pipeline: propose, sandbox, measure, validate, and apply
    /// when validation passes.
    pub async fn test_and_apply(
        &self,
        opportunity: &ImprovementOpportunity,
    ) -> DomainResult<PipelineOutcome> {
        let mut proposal = ImprovementProposal::from_opportunity(opportunity);
        info!(
            proposal_id = %proposal.id,
            kind = proposal.kind.as_str(),
            target = proposal.target_metric.as_str(),
            "proposal authored"
        );

        proposal.advance(ProposalStatus::Testing)?;
        let sandbox = self.run_sandbox(&proposal).await?;

        if sandbox.successes == 0 {
            proposal.advance(ProposalStatus::Rejected)?;
            warn!(proposal_id = %proposal.id, "every sandbox probe failed, rejecting");
            return Ok(PipelineOutcome {
                proposal,
                sandbox,
                impact: None,
                applied: None,
            });
        }

        proposal.advance(ProposalStatus::Measuring)?;
        let impact = self.measure_impact(&proposal).await?;

        if impact.validated {
            proposal.advance(ProposalStatus::Validated)?;
            let applied = self.apply_to_production(&mut proposal, &impact).await?;
            Ok(PipelineOutcome {
                proposal,
                sandbox,
                impact: Some(impact),
                applied: Some(applied),
            })
        } else {
            proposal.advance(ProposalStatus::Rejected)?;
            info!(
                proposal_id = %proposal.id,
                reason = %impact.validation_reason,
                "proposal rejected"
            );
            Ok(PipelineOutcome {
                proposal,
                sandbox,
                impact: Some(impact),
                applied: None,
            })
        }
    }

    async fn run_sandbox(&self, proposal: &ImprovementProposal) -> DomainResult<SandboxReport> {
        // The snapshot isolates the run from the live configuration.
        let _snapshot = self.sandbox.snapshot(proposal.agent_id).await?;

        let mut report = SandboxReport::default();
        let mut latency_sum = 0.0;
        for index in 0..self.config.probe_operations {
            report.operations += 1;
            match self.sandbox.probe(proposal, index).await {
                Ok(sample) => {
                    latency_sum += sample.latency_ms;
                    report.total_cost += sample.cost;
                    if sample.success {
                        report.successes += 1;
                    } else {
                        report.failures += 1;
                    }
                }
                Err(err) => {
                    report.failures += 1;
                    report.errors.push(err.to_string());
                }
            }
        }
        if report.operations > 0 {
            report.avg_latency_ms = latency_sum / f64::from(report.operations);
            report.avg_cost = report.total_cost / f64::from(report.operations);
        }
        Ok(report)
    }

    /// Baseline from the prior 14→7-day window, test metrics from the
    /// just-elapsed field window, daily samples for monotonicity checks.
    async fn measure_impact(
        &self,
        proposal: &ImprovementProposal,
    ) -> DomainResult<ImpactMeasurement> {
        let now = Utc::now();
        let span = ChronoDuration::days(self.config.field_test_days);
        let test_window = VelocityWindow::new(now - span, now);
        let baseline_window = test_window.prior();

        let baseline = self
            .telemetry
            .period_metrics(proposal.agent_id, baseline_window)
            .await?;
        let test_period = self
            .telemetry
            .period_metrics(proposal.agent_id, test_window)
            .await?;
        let daily_samples = self
            .telemetry
            .daily_samples(proposal.agent_id, test_window)
            .await?;

        Ok(ImpactMeasurement::evaluate(
            baseline,
            test_period,
            daily_samples,
            proposal.target_metric,
        ))
    }

    /// Apply a validated proposal: emit the change list and rollback
    /// plan, push each change through the apply capability, and unwind
    /// on partial failure. Only `validated` proposals may pass.
    pub async fn apply_to_production(
        &self,
        proposal: &mut ImprovementProposal,
        impact: &ImpactMeasurement,
    ) -> DomainResult<AppliedModification> {
        if proposal.status != ProposalStatus::Validated {
            return Err(DomainError::PreconditionFailed(
                "Cannot apply unvalidated improvement".to_string(),
            ));
        }

        let snapshot = self.sandbox.snapshot(proposal.agent_id).await?;
        let changes = self.sandbox.plan_changes(proposal, &snapshot);
        let rollback_plan = RollbackPlan::for_changes(&changes);

        let mut applied_so_far: Vec<&ConfigChange> = Vec::new();
        for change in &changes {
            if let Err(err) = self.applier.apply_change(proposal.agent_id, change).await {
                warn!(
                    proposal_id = %proposal.id,
                    target = %change.target,
                    error = %err,
                    "apply failed, unwinding"
                );
                for done in applied_so_far.into_iter().rev() {
                    if let Err(revert_err) =
                        self.applier.revert_change(proposal.agent_id, done).await
                    {
                        warn!(target = %done.target, error = %revert_err, "revert failed");
                    }
                }
                return Err(err);
            }
            applied_so_far.push(change);
        }

        proposal.advance(ProposalStatus::Applied)?;
        info!(proposal_id = %proposal.id, changes = changes.len(), "applied to production");

        Ok(AppliedModification {
            id: Uuid::new_v4(),
            proposal_id: proposal.id,
            changes,
            rollback_plan,
            impact: impact.clone(),
            impact_score: impact.impact_score(),
            applied_at: Utc::now(),
        })
    }

    /// Compare a fitness snapshot taken before the observation window to
    /// the current one; success is a rise of at least 5%.
    pub async fn track_success(
        &self,
        agent_id: Uuid,
        before: FitnessSnapshot,
    ) -> DomainResult<SuccessReport> {
        let after = self.telemetry.fitness_snapshot(agent_id).await?;
        let before_fitness = before.overall_fitness();
        let after_fitness = after.overall_fitness();
        let fitness_change = if before_fitness > 0.0 {
            (after_fitness - before_fitness) / before_fitness
        } else {
            0.0
        };
        Ok(SuccessReport {
            before,
            after,
            fitness_change,
            success: fitness_change >= SUCCESS_FITNESS_RISE,
        })
    }

    /// Project the 30-day return of a measured improvement, priced at
    /// what the sandbox run cost.
    pub async fn project_roi(
        &self,
        agent_id: Uuid,
        impact: &ImpactMeasurement,
        total_cost: f64,
    ) -> DomainResult<RoiProjection> {
        let ops_per_day = self.telemetry.operations_per_day(agent_id).await?;
        Ok(RoiProjection::project(
            impact.baseline.avg_cost,
            impact.test_period.avg_cost,
            ops_per_day,
            total_cost,
            impact,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OpportunityCategory;
    use serde_json::json;
    use std::sync::Mutex;

    struct StubSandbox {
        probe_success: bool,
    }

    #[async_trait]
    impl ImprovementSandbox for StubSandbox {
        async fn snapshot(&self, _agent_id: Uuid) -> DomainResult<HashMap<String, Value>> {
            Ok(HashMap::from([(
                "model_id".to_string(),
                json!("frontier-large"),
            )]))
        }

        fn plan_changes(
            &self,
            proposal: &ImprovementProposal,
            snapshot: &HashMap<String, Value>,
        ) -> Vec<ConfigChange> {
            vec![ConfigChange {
                target: "model_id".to_string(),
                old_value: snapshot.get("model_id").cloned().unwrap_or(Value::Null),
                new_value: json!(format!("optimized-for-{}", proposal.target_metric.as_str())),
            }]
        }

        async fn probe(
            &self,
            _proposal: &ImprovementProposal,
            index: u32,
        ) -> DomainResult<ProbeSample> {
            if self.probe_success {
                Ok(ProbeSample {
                    latency_ms: 100.0 + f64::from(index % 3),
                    cost: 0.01,
                    success: true,
                })
            } else {
                Err(DomainError::Transient("sandbox harness down".into()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingApplier {
        applied: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ProductionApplier for RecordingApplier {
        async fn apply_change(&self, _agent_id: Uuid, change: &ConfigChange) -> DomainResult<()> {
            if self.fail_on.as_deref() == Some(change.target.as_str()) {
                return Err(DomainError::Transient("apply surface down".into()));
            }
            self.applied.lock().unwrap().push(change.target.clone());
            Ok(())
        }

        async fn revert_change(&self, _agent_id: Uuid, change: &ConfigChange) -> DomainResult<()> {
            self.applied
                .lock()
                .unwrap()
                .retain(|t| t != &change.target);
            Ok(())
        }
    }

    struct StubTelemetry {
        baseline: PeriodMetrics,
        test: PeriodMetrics,
        fitness: FitnessSnapshot,
    }

    #[async_trait]
    impl TelemetrySource for StubTelemetry {
        async fn period_metrics(
            &self,
            _agent_id: Uuid,
            window: VelocityWindow,
        ) -> DomainResult<PeriodMetrics> {
            // The baseline window ends where the test window begins.
            if window.end < Utc::now() - ChronoDuration::days(6) {
                Ok(self.baseline)
            } else {
                Ok(self.test)
            }
        }

        async fn daily_samples(
            &self,
            _agent_id: Uuid,
            _window: VelocityWindow,
        ) -> DomainResult<Vec<DailySample>> {
            Ok((0..7)
                .map(|day| DailySample {
                    day,
                    avg_latency_ms: self.test.avg_latency_ms,
                    avg_cost: self.test.avg_cost,
                    success_rate: self.test.success_rate,
                })
                .collect())
        }

        async fn fitness_snapshot(&self, _agent_id: Uuid) -> DomainResult<FitnessSnapshot> {
            Ok(self.fitness)
        }

        async fn operations_per_day(&self, _agent_id: Uuid) -> DomainResult<f64> {
            Ok(100.0)
        }
    }

    fn metrics(latency: f64, cost: f64, success: f64) -> PeriodMetrics {
        PeriodMetrics {
            avg_latency_ms: latency,
            avg_cost: cost,
            success_rate: success,
            operation_count: 700,
        }
    }

    fn fitness(earnings: f64) -> FitnessSnapshot {
        FitnessSnapshot {
            survival_days: 30,
            net_balance: earnings,
            total_earnings: earnings,
            offspring_count: 0,
            successful_operations: 90,
            failed_operations: 10,
            taken_at: Utc::now(),
        }
    }

    fn pipeline(
        baseline: PeriodMetrics,
        test: PeriodMetrics,
        probe_success: bool,
    ) -> ImprovementPipeline {
        ImprovementPipeline::new(
            Arc::new(StubSandbox { probe_success }),
            Arc::new(RecordingApplier::default()),
            Arc::new(StubTelemetry {
                baseline,
                test,
                fitness: fitness(5.0),
            }),
            PipelineConfig {
                probe_operations: 10,
                field_test_days: 7,
            },
        )
    }

    #[tokio::test]
    async fn validated_proposal_is_applied() {
        let pipeline = pipeline(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.8, 0.95),
            true,
        );
        let opportunity = ImprovementOpportunity::new(
            Uuid::new_v4(),
            OpportunityCategory::Cost,
            "cheaper model fits these ops",
            20.0,
        );

        let outcome = pipeline.test_and_apply(&opportunity).await.unwrap();
        assert_eq!(outcome.proposal.status, ProposalStatus::Applied);
        let applied = outcome.applied.unwrap();
        assert_eq!(applied.changes.len(), 1);
        assert_eq!(applied.rollback_plan.steps.len(), 1);
        assert!(outcome.impact.unwrap().validated);
    }

    #[tokio::test]
    async fn reliability_regression_rejects() {
        let pipeline = pipeline(
            metrics(150.0, 0.5, 0.92),
            metrics(145.0, 0.5, 0.85),
            true,
        );
        let opportunity = ImprovementOpportunity::new(
            Uuid::new_v4(),
            OpportunityCategory::Speed,
            "tighter tool loop",
            10.0,
        );

        let outcome = pipeline.test_and_apply(&opportunity).await.unwrap();
        assert_eq!(outcome.proposal.status, ProposalStatus::Rejected);
        assert!(outcome.applied.is_none());
        let impact = outcome.impact.unwrap();
        assert!(!impact.validated);
        assert!(impact.validation_reason.contains("Reliability degraded"));
    }

    #[tokio::test]
    async fn dead_sandbox_rejects_before_measuring() {
        let pipeline = pipeline(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.5, 0.95),
            false,
        );
        let opportunity = ImprovementOpportunity::new(
            Uuid::new_v4(),
            OpportunityCategory::Cost,
            "anything",
            20.0,
        );

        let outcome = pipeline.test_and_apply(&opportunity).await.unwrap();
        assert_eq!(outcome.proposal.status, ProposalStatus::Rejected);
        assert!(outcome.impact.is_none());
        assert_eq!(outcome.sandbox.failures, 10);
        assert_eq!(outcome.sandbox.errors.len(), 10);
    }

    #[tokio::test]
    async fn unvalidated_apply_is_refused() {
        let pipeline = pipeline(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.8, 0.95),
            true,
        );
        let opportunity = ImprovementOpportunity::new(
            Uuid::new_v4(),
            OpportunityCategory::Cost,
            "x",
            20.0,
        );
        let mut proposal = ImprovementProposal::from_opportunity(&opportunity);
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.8, 0.95),
            vec![],
            proposal.target_metric,
        );

        let err = pipeline
            .apply_to_production(&mut proposal, &impact)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot apply unvalidated improvement"));
    }

    #[tokio::test]
    async fn success_tracking_compares_snapshots() {
        let pipeline = pipeline(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.8, 0.95),
            true,
        );
        // Baseline snapshot with much lower earnings than the stub's
        // current one.
        let before = fitness(0.5);
        let report = pipeline
            .track_success(Uuid::new_v4(), before)
            .await
            .unwrap();
        assert!(report.fitness_change > SUCCESS_FITNESS_RISE);
        assert!(report.success);
    }

    #[tokio::test]
    async fn roi_uses_measured_costs() {
        let pipeline = pipeline(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.5, 0.95),
            true,
        );
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 1.0, 0.95),
            metrics(100.0, 0.5, 0.95),
            vec![],
            crate::domain::models::TargetMetric::Cost,
        );
        let roi = pipeline
            .project_roi(Uuid::new_v4(), &impact, 150.0)
            .await
            .unwrap();
        // (1.0 − 0.5) × 100 ops/day × 30 days = 1500 saved.
        assert!((roi.projected_savings_30d - 1500.0).abs() < 1e-9);
        assert!(roi.roi_pct > 0.0);
    }
}
