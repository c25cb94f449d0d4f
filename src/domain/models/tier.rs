//! Survival tier domain model.
//!
//! Maps a continuous economic balance to a discrete capability bracket.
//! The tier gates what an agent is permitted to attempt: replication,
//! experimentation, and which model class it may call.

use serde::{Deserialize, Serialize};

/// Discrete capability bracket derived from an agent's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivalTier {
    /// Balance ≥ 10: full capabilities, premium model access.
    Thriving,
    /// Balance ≥ 1: standard operation.
    Normal,
    /// Balance ≥ 0.1: reduced compute, cheap models only.
    LowCompute,
    /// Balance ≥ 0.01: minimal survival operations.
    Critical,
    /// Balance < 0.01: no capabilities, pending termination.
    Dead,
}

/// Tiers ordered by `min_balance` descending. Classification picks the
/// first tier whose floor the balance reaches.
pub const TIER_ORDER: [SurvivalTier; 5] = [
    SurvivalTier::Thriving,
    SurvivalTier::Normal,
    SurvivalTier::LowCompute,
    SurvivalTier::Critical,
    SurvivalTier::Dead,
];

impl SurvivalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thriving => "thriving",
            Self::Normal => "normal",
            Self::LowCompute => "low-compute",
            Self::Critical => "critical",
            Self::Dead => "dead",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "thriving" => Some(Self::Thriving),
            "normal" => Some(Self::Normal),
            "low-compute" | "low_compute" => Some(Self::LowCompute),
            "critical" => Some(Self::Critical),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }

    /// Minimum balance required to hold this tier. Balances equal to the
    /// floor belong to the tier, not the one below.
    pub fn min_balance(&self) -> f64 {
        match self {
            Self::Thriving => 10.0,
            Self::Normal => 1.0,
            Self::LowCompute => 0.1,
            Self::Critical => 0.01,
            Self::Dead => 0.0,
        }
    }

    /// Model class an agent in this tier may call. Opaque id; "none"
    /// means no inference at all.
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Thriving => "frontier-large",
            Self::Normal => "frontier-standard",
            Self::LowCompute => "frontier-mini",
            Self::Critical => "frontier-nano",
            Self::Dead => "none",
        }
    }

    /// Declared capabilities for this tier.
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::Thriving => &["inference", "tool_use", "trade", "replicate", "experiment"],
            Self::Normal => &["inference", "tool_use", "trade"],
            Self::LowCompute => &["inference", "tool_use"],
            Self::Critical => &["inference"],
            Self::Dead => &[],
        }
    }

    pub fn can_replicate(&self) -> bool {
        matches!(self, Self::Thriving)
    }

    pub fn can_experiment(&self) -> bool {
        matches!(self, Self::Thriving | Self::Normal)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Dead)
    }

    /// Rank used for ordering comparisons; higher is better.
    fn rank(&self) -> u8 {
        match self {
            Self::Thriving => 4,
            Self::Normal => 3,
            Self::LowCompute => 2,
            Self::Critical => 1,
            Self::Dead => 0,
        }
    }
}

impl std::fmt::Display for SurvivalTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a balance into its survival tier.
///
/// Total and deterministic: for any non-negative balance exactly one tier
/// matches — the highest whose floor the balance reaches. Negative
/// balances are clamped to dead.
pub fn tier_of(balance: f64) -> SurvivalTier {
    for tier in TIER_ORDER {
        if balance >= tier.min_balance() {
            return tier;
        }
    }
    SurvivalTier::Dead
}

/// Direction of a tier change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierDirection {
    Upgrade,
    Downgrade,
    None,
}

/// Record of a balance change crossing zero or more tier boundaries.
/// Multi-tier jumps produce a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub from: SurvivalTier,
    pub to: SurvivalTier,
    pub direction: TierDirection,
    pub balance_delta: f64,
}

/// Compare two balances and report the tier transition between them.
pub fn tier_transition(old_balance: f64, new_balance: f64) -> TierTransition {
    let from = tier_of(old_balance);
    let to = tier_of(new_balance);
    let direction = match to.rank().cmp(&from.rank()) {
        std::cmp::Ordering::Greater => TierDirection::Upgrade,
        std::cmp::Ordering::Less => TierDirection::Downgrade,
        std::cmp::Ordering::Equal => TierDirection::None,
    };
    TierTransition {
        from,
        to,
        direction,
        balance_delta: new_balance - old_balance,
    }
}
