//! Improvement velocity tracking and the capability gate.
//!
//! Accumulates applied-improvement impacts per agent and evaluates
//! windowed velocity, trend flags, and gate alerts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{
    AppliedModification, ImpactSample, VelocityAlert, VelocityMeasurement, VelocityTrend,
    VelocityWindow,
};

pub struct VelocityTracker {
    window_days: i64,
    samples: Vec<ImpactSample>,
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new(7)
    }
}

impl VelocityTracker {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days: window_days.max(1),
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, sample: ImpactSample) {
        self.samples.push(sample);
    }

    /// Record the deltas of a modification that reached production.
    pub fn record_modification(&mut self, agent_id: Uuid, modification: &AppliedModification) {
        self.record(ImpactSample {
            agent_id,
            applied_at: modification.applied_at,
            speed_improvement_pct: modification.impact.speed_improvement_pct,
            cost_reduction_pct: modification.impact.cost_reduction_pct,
            reliability_improvement_pp: modification.impact.reliability_improvement_pp,
        });
    }

    fn window_ending(&self, end: DateTime<Utc>) -> VelocityWindow {
        VelocityWindow::new(end - ChronoDuration::days(self.window_days), end)
    }

    /// Velocity over the window ending now.
    pub fn measure(&self, agent_id: Uuid) -> VelocityMeasurement {
        self.measure_at(agent_id, Utc::now())
    }

    pub fn measure_at(&self, agent_id: Uuid, end: DateTime<Utc>) -> VelocityMeasurement {
        VelocityMeasurement::over_window(agent_id, self.window_ending(end), &self.samples)
    }

    /// Trend of the current window against the prior one. An empty prior
    /// window yields no trend baseline.
    pub fn analyze(&self, agent_id: Uuid) -> VelocityTrend {
        self.analyze_at(agent_id, Utc::now())
    }

    pub fn analyze_at(&self, agent_id: Uuid, end: DateTime<Utc>) -> VelocityTrend {
        let current_window = self.window_ending(end);
        let current = VelocityMeasurement::over_window(agent_id, current_window, &self.samples);
        let prior_window = current_window.prior();
        let prior =
            VelocityMeasurement::over_window(agent_id, prior_window, &self.samples);
        let prior = (prior.improvements_counted > 0).then_some(prior);

        let trend = VelocityTrend::analyze(current, prior);
        if trend.rapid_growth {
            warn!(
                agent_id = %agent_id,
                gain_per_day = trend.current.capability_gain_per_day(),
                "capability gate breached"
            );
        }
        trend
    }

    /// Alerts for the current trend, most severe first.
    pub fn alerts(&self, agent_id: Uuid) -> Vec<VelocityAlert> {
        self.analyze(agent_id).alerts()
    }

    /// Whether the agent's current velocity stays inside the gate.
    pub fn within_capability_gates(&self, agent_id: Uuid) -> bool {
        self.measure(agent_id).within_capability_gate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(agent: Uuid, days_ago: i64, speed: f64) -> ImpactSample {
        ImpactSample {
            agent_id: agent,
            applied_at: Utc::now() - ChronoDuration::days(days_ago),
            speed_improvement_pct: speed,
            cost_reduction_pct: 0.0,
            reliability_improvement_pp: 0.0,
        }
    }

    #[test]
    fn gate_holds_for_modest_improvements() {
        let agent = Uuid::new_v4();
        let mut tracker = VelocityTracker::default();
        tracker.record(sample_at(agent, 1, 35.0));
        // 35% over 7 days → 0.4 × 5 = 2%/day capability gain.
        assert!(tracker.within_capability_gates(agent));
        let trend = tracker.analyze(agent);
        assert!(!trend.rapid_growth);
    }

    #[test]
    fn gate_breach_raises_critical_alert() {
        let agent = Uuid::new_v4();
        let mut tracker = VelocityTracker::default();
        // 0.4 × (200/7) ≈ 11.4%/day, past the gate.
        tracker.record(sample_at(agent, 1, 100.0));
        tracker.record(sample_at(agent, 2, 100.0));
        assert!(!tracker.within_capability_gates(agent));

        let alerts = tracker.alerts(agent);
        assert!(alerts
            .iter()
            .any(|a| a.severity == crate::domain::models::AlertSeverity::Critical));
    }

    #[test]
    fn empty_prior_window_gives_no_trend() {
        let agent = Uuid::new_v4();
        let mut tracker = VelocityTracker::default();
        tracker.record(sample_at(agent, 1, 20.0));
        let trend = tracker.analyze(agent);
        assert!(trend.prior.is_none());
        assert!(trend.acceleration_rate.is_none());
    }

    #[test]
    fn acceleration_against_prior_window() {
        let agent = Uuid::new_v4();
        let mut tracker = VelocityTracker::default();
        // Prior window (7–14 days ago): 10% total.
        tracker.record(sample_at(agent, 10, 10.0));
        // Current window: 20% total, double the prior rate.
        tracker.record(sample_at(agent, 2, 20.0));

        let trend = tracker.analyze(agent);
        assert!(trend.prior.is_some());
        assert!(trend.accelerating);
        assert!(trend.projected_days_to_violation().is_some());
    }

    #[test]
    fn modification_records_feed_the_tracker() {
        use crate::domain::models::{
            ImpactMeasurement, PeriodMetrics, RollbackPlan, TargetMetric,
        };

        let agent = Uuid::new_v4();
        let impact = ImpactMeasurement::evaluate(
            PeriodMetrics {
                avg_latency_ms: 100.0,
                avg_cost: 1.0,
                success_rate: 0.9,
                operation_count: 100,
            },
            PeriodMetrics {
                avg_latency_ms: 80.0,
                avg_cost: 0.9,
                success_rate: 0.9,
                operation_count: 100,
            },
            vec![],
            TargetMetric::Speed,
        );
        let modification = AppliedModification {
            id: Uuid::new_v4(),
            proposal_id: Uuid::new_v4(),
            changes: vec![],
            rollback_plan: RollbackPlan { steps: vec![] },
            impact: impact.clone(),
            impact_score: impact.impact_score(),
            applied_at: Utc::now(),
        };

        let mut tracker = VelocityTracker::default();
        tracker.record_modification(agent, &modification);
        let measurement = tracker.measure(agent);
        assert_eq!(measurement.improvements_counted, 1);
        assert!(measurement.speed_pct_per_day > 0.0);
    }
}
