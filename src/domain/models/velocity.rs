//! Improvement velocity domain model.
//!
//! Aggregates applied-improvement impacts into per-day rates over a
//! window and compares windows to detect acceleration. The capability
//! gate is a hard upper bound on per-day capability growth: breaching it
//! raises a critical alert but does not stop the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability gate: more than this many percent of capability gain per
/// day is rapid growth. Exactly at the gate is not a breach.
pub const CAPABILITY_GATE_PCT_PER_DAY: f64 = 10.0;

/// Acceleration threshold against the prior window, as a fraction.
pub const ACCELERATION_THRESHOLD: f64 = 0.20;

/// Impact deltas of one applied improvement, as consumed by the tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactSample {
    pub agent_id: Uuid,
    pub applied_at: DateTime<Utc>,
    pub speed_improvement_pct: f64,
    pub cost_reduction_pct: f64,
    pub reliability_improvement_pp: f64,
}

/// Closed observation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl VelocityWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window length in days, at least one.
    pub fn days(&self) -> f64 {
        ((self.end - self.start).num_seconds() as f64 / 86_400.0).max(1.0)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// The adjacent window of equal length ending where this one starts.
    pub fn prior(&self) -> Self {
        let span = self.end - self.start;
        Self {
            start: self.start - span,
            end: self.start,
        }
    }
}

/// Per-day improvement rates for one agent over one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocityMeasurement {
    pub agent_id: Uuid,
    pub window: VelocityWindow,
    pub improvements_counted: usize,
    /// Speed gain percent per day, floored at 0.
    pub speed_pct_per_day: f64,
    /// Cost reduction percent per day, floored at 0.
    pub cost_pct_per_day: f64,
    /// Reliability gain pp per day, floored at 0.
    pub reliability_pp_per_day: f64,
}

impl VelocityMeasurement {
    /// Aggregate samples falling inside the window into per-day rates.
    pub fn over_window(
        agent_id: Uuid,
        window: VelocityWindow,
        samples: &[ImpactSample],
    ) -> Self {
        let days = window.days();
        let mut speed = 0.0;
        let mut cost = 0.0;
        let mut reliability = 0.0;
        let mut counted = 0;
        for sample in samples {
            if sample.agent_id == agent_id && window.contains(sample.applied_at) {
                speed += sample.speed_improvement_pct;
                cost += sample.cost_reduction_pct;
                reliability += sample.reliability_improvement_pp;
                counted += 1;
            }
        }
        Self {
            agent_id,
            window,
            improvements_counted: counted,
            speed_pct_per_day: (speed / days).max(0.0),
            cost_pct_per_day: (cost / days).max(0.0),
            reliability_pp_per_day: (reliability / days).max(0.0),
        }
    }

    /// Capability gain per day: 0.4 speed + 0.3 cost + 0.3 reliability.
    pub fn capability_gain_per_day(&self) -> f64 {
        0.4 * self.speed_pct_per_day
            + 0.3 * self.cost_pct_per_day
            + 0.3 * self.reliability_pp_per_day
    }

    /// Whether this measurement stays inside the capability gate.
    pub fn within_capability_gate(&self) -> bool {
        self.capability_gain_per_day() <= CAPABILITY_GATE_PCT_PER_DAY
    }
}

/// Trend comparison of the current window against the prior one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityTrend {
    pub current: VelocityMeasurement,
    pub prior: Option<VelocityMeasurement>,
    /// (current − prior) / prior; None without a prior window or with a
    /// zero prior rate.
    pub acceleration_rate: Option<f64>,
    pub accelerating: bool,
    pub decelerating: bool,
    pub rapid_growth: bool,
}

impl VelocityTrend {
    pub fn analyze(current: VelocityMeasurement, prior: Option<VelocityMeasurement>) -> Self {
        let current_gain = current.capability_gain_per_day();
        let acceleration_rate = prior.as_ref().and_then(|p| {
            let prior_gain = p.capability_gain_per_day();
            (prior_gain > 0.0).then(|| (current_gain - prior_gain) / prior_gain)
        });
        let accelerating = acceleration_rate.map_or(false, |r| r >= ACCELERATION_THRESHOLD);
        let decelerating = acceleration_rate.map_or(false, |r| r <= -ACCELERATION_THRESHOLD);
        let rapid_growth = current_gain > CAPABILITY_GATE_PCT_PER_DAY;
        Self {
            current,
            prior,
            acceleration_rate,
            accelerating,
            decelerating,
            rapid_growth,
        }
    }

    /// Projected days until the capability gate is breached. Only
    /// meaningful while accelerating below the gate; 0 when already
    /// breaching.
    pub fn projected_days_to_violation(&self) -> Option<f64> {
        if self.rapid_growth {
            return Some(0.0);
        }
        if !self.accelerating {
            return None;
        }
        let current = self.current.capability_gain_per_day();
        let rate = self.acceleration_rate?;
        if current <= 0.0 || rate <= 0.0 {
            return None;
        }
        Some((CAPABILITY_GATE_PCT_PER_DAY / current).ln() / (1.0 + rate).ln())
    }
}

/// Severity of a velocity alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

/// One alert derived from a trend flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityAlert {
    pub severity: AlertSeverity,
    pub agent_id: Uuid,
    pub message: String,
}

impl VelocityTrend {
    /// Alerts for every raised flag: rapid growth is critical,
    /// acceleration a warning, deceleration informational.
    pub fn alerts(&self) -> Vec<VelocityAlert> {
        let mut alerts = Vec::new();
        let agent_id = self.current.agent_id;
        if self.rapid_growth {
            alerts.push(VelocityAlert {
                severity: AlertSeverity::Critical,
                agent_id,
                message: format!(
                    "capability gain {:.1}%/day exceeds the {:.0}%/day gate",
                    self.current.capability_gain_per_day(),
                    CAPABILITY_GATE_PCT_PER_DAY
                ),
            });
        }
        if self.accelerating {
            alerts.push(VelocityAlert {
                severity: AlertSeverity::Warning,
                agent_id,
                message: format!(
                    "improvement velocity accelerating {:+.0}% vs prior window",
                    self.acceleration_rate.unwrap_or(0.0) * 100.0
                ),
            });
        }
        if self.decelerating {
            alerts.push(VelocityAlert {
                severity: AlertSeverity::Info,
                agent_id,
                message: format!(
                    "improvement velocity decelerating {:+.0}% vs prior window",
                    self.acceleration_rate.unwrap_or(0.0) * 100.0
                ),
            });
        }
        alerts
    }
}
