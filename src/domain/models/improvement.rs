//! Self-improvement domain model.
//!
//! Proposals progress through a strict pipeline: proposed → testing →
//! measuring → {validated → applied, rejected}. Impact is measured
//! against a fixed 7-day field window and validated with a reliability
//! guard before anything touches production.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Where an improvement opportunity was mined from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityCategory {
    Cost,
    Speed,
    Reliability,
    Other,
}

impl OpportunityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Speed => "speed",
            Self::Reliability => "reliability",
            Self::Other => "other",
        }
    }

    /// The modification kind a proposal for this category takes.
    pub fn proposal_kind(&self) -> ProposalKind {
        match self {
            Self::Cost => ProposalKind::ModelSwitch,
            Self::Speed => ProposalKind::ToolOptimization,
            Self::Reliability => ProposalKind::PromptRefinement,
            Self::Other => ProposalKind::ConfigChange,
        }
    }

    /// The metric a proposal for this category is validated against.
    /// Uncategorised opportunities target cost, the economic default.
    pub fn target_metric(&self) -> TargetMetric {
        match self {
            Self::Cost | Self::Other => TargetMetric::Cost,
            Self::Speed => TargetMetric::Speed,
            Self::Reliability => TargetMetric::Reliability,
        }
    }
}

/// A mined performance bottleneck worth attacking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementOpportunity {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub category: OpportunityCategory,
    pub description: String,
    /// Expected improvement on the target metric, percent.
    pub expected_impact_pct: f64,
}

impl ImprovementOpportunity {
    pub fn new(
        agent_id: Uuid,
        category: OpportunityCategory,
        description: impl Into<String>,
        expected_impact_pct: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            category,
            description: description.into(),
            expected_impact_pct,
        }
    }
}

/// Kind of modification a proposal makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    ModelSwitch,
    ToolOptimization,
    PromptRefinement,
    ConfigChange,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelSwitch => "model_switch",
            Self::ToolOptimization => "tool_optimization",
            Self::PromptRefinement => "prompt_refinement",
            Self::ConfigChange => "config_change",
        }
    }
}

/// Metric a proposal is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    Speed,
    Cost,
    Reliability,
}

impl TargetMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Cost => "cost",
            Self::Reliability => "reliability",
        }
    }

    /// Validation threshold: percent for speed and cost, percentage
    /// points for reliability.
    pub fn threshold(&self) -> f64 {
        match self {
            Self::Speed | Self::Cost => 10.0,
            Self::Reliability => 5.0,
        }
    }
}

/// Pipeline state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Proposed,
    Testing,
    Measuring,
    Validated,
    Applied,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Testing => "testing",
            Self::Measuring => "measuring",
            Self::Validated => "validated",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
        }
    }

    pub fn valid_transitions(&self) -> &'static [ProposalStatus] {
        match self {
            Self::Proposed => &[Self::Testing],
            Self::Testing => &[Self::Measuring, Self::Rejected],
            Self::Measuring => &[Self::Validated, Self::Rejected],
            Self::Validated => &[Self::Applied],
            Self::Applied | Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// A proposed self-modification with an explicit hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementProposal {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub opportunity_id: Uuid,
    pub kind: ProposalKind,
    pub target_metric: TargetMetric,
    pub expected_improvement_pct: f64,
    pub hypothesis: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

impl ImprovementProposal {
    /// Author a proposal from a mined opportunity.
    pub fn from_opportunity(opportunity: &ImprovementOpportunity) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: opportunity.agent_id,
            opportunity_id: opportunity.id,
            kind: opportunity.category.proposal_kind(),
            target_metric: opportunity.category.target_metric(),
            expected_improvement_pct: opportunity.expected_impact_pct,
            hypothesis: format!(
                "Applying {} will improve {} by {:.1}% ({})",
                opportunity.category.proposal_kind().as_str(),
                opportunity.category.target_metric().as_str(),
                opportunity.expected_impact_pct,
                opportunity.description,
            ),
            status: ProposalStatus::Proposed,
            created_at: Utc::now(),
        }
    }

    /// Advance the pipeline state, rejecting skips and regressions.
    pub fn advance(&mut self, to: ProposalStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Aggregate metrics over one observation period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    /// Fraction of operations that succeeded, 0..1.
    pub success_rate: f64,
    pub operation_count: u64,
}

/// One day of the field-test window, kept for monotonicity checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailySample {
    pub day: u32,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    pub success_rate: f64,
}

/// Measured impact of a proposal over the 7-day field test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactMeasurement {
    pub baseline: PeriodMetrics,
    pub test_period: PeriodMetrics,
    pub daily_samples: Vec<DailySample>,
    /// Latency reduction, percent of baseline.
    pub speed_improvement_pct: f64,
    /// Cost reduction, percent of baseline.
    pub cost_reduction_pct: f64,
    /// Success-rate change in percentage points.
    pub reliability_improvement_pp: f64,
    pub validated: bool,
    pub validation_reason: String,
}

/// Reliability may not drop more than this many percentage points.
pub const RELIABILITY_GUARD_PP: f64 = 5.0;

impl ImpactMeasurement {
    /// Compute deltas and apply the validation rule for the given target
    /// metric.
    pub fn evaluate(
        baseline: PeriodMetrics,
        test_period: PeriodMetrics,
        daily_samples: Vec<DailySample>,
        target: TargetMetric,
    ) -> Self {
        let speed_improvement_pct = if baseline.avg_latency_ms > 0.0 {
            (baseline.avg_latency_ms - test_period.avg_latency_ms) / baseline.avg_latency_ms * 100.0
        } else {
            0.0
        };
        let cost_reduction_pct = if baseline.avg_cost > 0.0 {
            (baseline.avg_cost - test_period.avg_cost) / baseline.avg_cost * 100.0
        } else {
            0.0
        };
        let reliability_improvement_pp =
            (test_period.success_rate - baseline.success_rate) * 100.0;

        let (validated, validation_reason) = if reliability_improvement_pp < -RELIABILITY_GUARD_PP {
            (
                false,
                format!(
                    "Reliability degraded by {:.1} pp (limit {:.0} pp)",
                    -reliability_improvement_pp, RELIABILITY_GUARD_PP
                ),
            )
        } else {
            let delta = match target {
                TargetMetric::Speed => speed_improvement_pct,
                TargetMetric::Cost => cost_reduction_pct,
                TargetMetric::Reliability => reliability_improvement_pp,
            };
            let threshold = target.threshold();
            if delta >= threshold {
                (
                    true,
                    format!(
                        "{} improved by {:.1} (threshold {:.0})",
                        target.as_str(),
                        delta,
                        threshold
                    ),
                )
            } else {
                (
                    false,
                    format!(
                        "{} delta {:.1} below threshold {:.0}",
                        target.as_str(),
                        delta,
                        threshold
                    ),
                )
            }
        };

        Self {
            baseline,
            test_period,
            daily_samples,
            speed_improvement_pct,
            cost_reduction_pct,
            reliability_improvement_pp,
            validated,
            validation_reason,
        }
    }

    /// Overall impact score, weighted toward cost.
    pub fn impact_score(&self) -> f64 {
        0.3 * self.speed_improvement_pct
            + 0.4 * self.cost_reduction_pct
            + 0.3 * self.reliability_improvement_pp
    }
}

/// One concrete mutation applied to production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChange {
    /// Mutation surface: config key, prompt id, tool name, model id.
    pub target: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// One inverse step in a rollback plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStep {
    pub order: u32,
    pub action: String,
    pub estimated_duration_ms: u64,
}

/// Ordered revert path for an applied modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub steps: Vec<RollbackStep>,
}

impl RollbackPlan {
    /// Derive the plan by inverting the change list, last change first.
    pub fn for_changes(changes: &[ConfigChange]) -> Self {
        let steps = changes
            .iter()
            .rev()
            .enumerate()
            .map(|(i, change)| RollbackStep {
                order: i as u32,
                action: format!("restore {} to previous value", change.target),
                estimated_duration_ms: 500,
            })
            .collect();
        Self { steps }
    }

    pub fn estimated_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.estimated_duration_ms).sum()
    }
}

/// Record of a modification that reached production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedModification {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub changes: Vec<ConfigChange>,
    pub rollback_plan: RollbackPlan,
    pub impact: ImpactMeasurement,
    pub impact_score: f64,
    pub applied_at: DateTime<Utc>,
}

/// Point-in-time fitness reading used for post-apply success tracking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessSnapshot {
    pub survival_days: u32,
    pub net_balance: f64,
    pub total_earnings: f64,
    pub offspring_count: u32,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub taken_at: DateTime<Utc>,
}

impl FitnessSnapshot {
    /// Overall fitness: 0.25 survival + 0.35 earnings + 0.20 offspring +
    /// 0.20 operational reliability, each component normalised to 0..1.
    pub fn overall_fitness(&self) -> f64 {
        let survival = (f64::from(self.survival_days) / 365.0).min(1.0);
        let earnings = self.total_earnings / (self.total_earnings + 1.0);
        let offspring = (f64::from(self.offspring_count) / 10.0).min(1.0);
        let total_ops = self.successful_operations + self.failed_operations;
        let reliability = if total_ops == 0 {
            1.0
        } else {
            self.successful_operations as f64 / total_ops as f64
        };
        0.25 * survival + 0.35 * earnings.max(0.0) + 0.20 * offspring + 0.20 * reliability
    }
}

/// Projected return on an applied improvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiProjection {
    /// Savings projected over 30 days of current volume.
    pub projected_savings_30d: f64,
    pub roi_pct: f64,
    /// Days until the improvement pays for itself; None when it never
    /// does.
    pub payback_days: Option<f64>,
    /// Composite value in 0..100.
    pub value_score: f64,
}

impl RoiProjection {
    pub fn project(
        baseline_cost_per_op: f64,
        improved_cost_per_op: f64,
        ops_per_day: f64,
        total_cost: f64,
        impact: &ImpactMeasurement,
    ) -> Self {
        let projected_savings_30d =
            (baseline_cost_per_op - improved_cost_per_op) * ops_per_day * 30.0;
        let roi_pct = if total_cost > 0.0 {
            (projected_savings_30d - total_cost) / total_cost * 100.0
        } else {
            0.0
        };
        let payback_days = if projected_savings_30d > 0.0 {
            Some(total_cost / (projected_savings_30d / 30.0))
        } else {
            None
        };

        let roi_term = (roi_pct / 100.0).clamp(0.0, 1.0);
        let payback_term = payback_days
            .map_or(0.0, |days| 1.0 - (days / 30.0).min(1.0));
        let reliability_term = (impact.reliability_improvement_pp / 10.0).clamp(0.0, 1.0);
        let time_term = (impact.speed_improvement_pct / 50.0).clamp(0.0, 1.0);
        let value_score =
            (0.4 * roi_term + 0.3 * payback_term + 0.2 * reliability_term + 0.1 * time_term)
                * 100.0;

        Self {
            projected_savings_30d,
            roi_pct,
            payback_days,
            value_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(latency: f64, cost: f64, success: f64) -> PeriodMetrics {
        PeriodMetrics {
            avg_latency_ms: latency,
            avg_cost: cost,
            success_rate: success,
            operation_count: 1000,
        }
    }

    #[test]
    fn category_mapping() {
        assert_eq!(
            OpportunityCategory::Cost.proposal_kind(),
            ProposalKind::ModelSwitch
        );
        assert_eq!(
            OpportunityCategory::Speed.proposal_kind(),
            ProposalKind::ToolOptimization
        );
        assert_eq!(
            OpportunityCategory::Reliability.proposal_kind(),
            ProposalKind::PromptRefinement
        );
        assert_eq!(
            OpportunityCategory::Other.proposal_kind(),
            ProposalKind::ConfigChange
        );
    }

    #[test]
    fn status_progression_is_strict() {
        let opportunity = ImprovementOpportunity::new(
            Uuid::new_v4(),
            OpportunityCategory::Cost,
            "expensive model on trivial ops",
            20.0,
        );
        let mut proposal = ImprovementProposal::from_opportunity(&opportunity);
        assert_eq!(proposal.status, ProposalStatus::Proposed);

        assert!(proposal.advance(ProposalStatus::Applied).is_err());
        proposal.advance(ProposalStatus::Testing).unwrap();
        proposal.advance(ProposalStatus::Measuring).unwrap();
        proposal.advance(ProposalStatus::Validated).unwrap();
        proposal.advance(ProposalStatus::Applied).unwrap();
        assert!(proposal.advance(ProposalStatus::Rejected).is_err());
    }

    #[test]
    fn reliability_guard_rejects() {
        let impact = ImpactMeasurement::evaluate(
            metrics(150.0, 0.5, 0.92),
            metrics(145.0, 0.5, 0.85),
            vec![],
            TargetMetric::Speed,
        );
        assert!(!impact.validated);
        assert!(impact.validation_reason.contains("Reliability degraded"));
        assert!((impact.reliability_improvement_pp + 7.0).abs() < 1e-9);
    }

    #[test]
    fn target_threshold_validates() {
        let impact = ImpactMeasurement::evaluate(
            metrics(200.0, 0.5, 0.95),
            metrics(170.0, 0.5, 0.94),
            vec![],
            TargetMetric::Speed,
        );
        assert!(impact.validated, "{}", impact.validation_reason);
        assert!((impact.speed_improvement_pct - 15.0).abs() < 1e-9);
    }

    #[test]
    fn below_threshold_rejects_without_guard_breach() {
        let impact = ImpactMeasurement::evaluate(
            metrics(200.0, 0.5, 0.95),
            metrics(195.0, 0.5, 0.95),
            vec![],
            TargetMetric::Speed,
        );
        assert!(!impact.validated);
        assert!(impact.validation_reason.contains("below threshold"));
    }

    #[test]
    fn reliability_target_uses_pp_threshold() {
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 0.5, 0.80),
            metrics(100.0, 0.5, 0.86),
            vec![],
            TargetMetric::Reliability,
        );
        assert!(impact.validated);
    }

    #[test]
    fn impact_score_weighting() {
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 1.0, 0.90),
            metrics(90.0, 0.8, 0.90),
            vec![],
            TargetMetric::Cost,
        );
        // speed 10%, cost 20%, reliability 0 pp
        assert!((impact.impact_score() - (0.3 * 10.0 + 0.4 * 20.0)).abs() < 1e-9);
    }

    #[test]
    fn rollback_plan_inverts_changes() {
        let changes = vec![
            ConfigChange {
                target: "model_id".into(),
                old_value: serde_json::json!("frontier-large"),
                new_value: serde_json::json!("frontier-mini"),
            },
            ConfigChange {
                target: "max_tokens".into(),
                old_value: serde_json::json!(4096),
                new_value: serde_json::json!(1024),
            },
        ];
        let plan = RollbackPlan::for_changes(&changes);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[0].action.contains("max_tokens"));
        assert!(plan.steps[1].action.contains("model_id"));
        assert_eq!(plan.estimated_duration_ms(), 1000);
    }

    #[test]
    fn roi_projection_payback() {
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 1.0, 0.9),
            metrics(100.0, 0.5, 0.9),
            vec![],
            TargetMetric::Cost,
        );
        let roi = RoiProjection::project(1.0, 0.5, 100.0, 300.0, &impact);
        // savings: 0.5 * 100 * 30 = 1500; roi = (1500-300)/300 = 400%
        assert!((roi.projected_savings_30d - 1500.0).abs() < 1e-9);
        assert!((roi.roi_pct - 400.0).abs() < 1e-9);
        assert!((roi.payback_days.unwrap() - 6.0).abs() < 1e-9);
        assert!(roi.value_score > 0.0 && roi.value_score <= 100.0);
    }

    #[test]
    fn roi_without_savings_never_pays_back() {
        let impact = ImpactMeasurement::evaluate(
            metrics(100.0, 0.5, 0.9),
            metrics(100.0, 0.5, 0.9),
            vec![],
            TargetMetric::Cost,
        );
        let roi = RoiProjection::project(0.5, 0.5, 100.0, 300.0, &impact);
        assert!(roi.payback_days.is_none());
        assert!(roi.roi_pct < 0.0);
    }

    #[test]
    fn fitness_snapshot_weights() {
        let snapshot = FitnessSnapshot {
            survival_days: 365,
            net_balance: 10.0,
            total_earnings: 0.0,
            offspring_count: 10,
            successful_operations: 100,
            failed_operations: 0,
            taken_at: Utc::now(),
        };
        // survival 1.0, earnings 0.0, offspring 1.0, reliability 1.0
        assert!((snapshot.overall_fitness() - (0.25 + 0.20 + 0.20)).abs() < 1e-9);
    }
}
