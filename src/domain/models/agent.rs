//! Agent domain model.
//!
//! Agents are autonomous entities operating under hard economic
//! constraints. Balance drives the survival tier; the tier gates what
//! an agent may attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tier::{tier_of, SurvivalTier};

/// Liveness state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessState {
    /// Operating normally.
    Alive,
    /// Suspended, not accepting work.
    Dormant,
    /// Terminated; tier reached dead or liveness set explicitly.
    Dead,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::Alive
    }
}

impl LivenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dormant => "dormant",
            Self::Dead => "dead",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alive" => Some(Self::Alive),
            "dormant" => Some(Self::Dormant),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Load capacity band derived from balance, used to cap concurrent
/// subtask assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalityBand {
    Flourishing,
    Thriving,
    Surviving,
    Struggling,
}

impl VitalityBand {
    /// Classify a balance into a load band. Shares the survival tier
    /// floors but collapses critical and dead into struggling.
    pub fn from_balance(balance: f64) -> Self {
        if balance >= 10.0 {
            Self::Flourishing
        } else if balance >= 1.0 {
            Self::Thriving
        } else if balance >= 0.1 {
            Self::Surviving
        } else {
            Self::Struggling
        }
    }

    /// Maximum concurrent subtask assignments for this band.
    pub fn max_load(&self) -> usize {
        match self {
            Self::Flourishing => 5,
            Self::Thriving => 3,
            Self::Surviving => 2,
            Self::Struggling => 1,
        }
    }
}

/// Normalised fitness components, each in 0..1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentFitness {
    pub survival: f64,
    pub earnings: f64,
    pub offspring: f64,
    pub adaptation: f64,
    pub innovation: f64,
}

impl AgentFitness {
    /// Overall fitness as the mean of the five components.
    pub fn overall(&self) -> f64 {
        (self.survival + self.earnings + self.offspring + self.adaptation + self.innovation) / 5.0
    }
}

/// Declared skills and tools an agent brings to role matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTraits {
    pub skills: Vec<String>,
    pub tools: Vec<String>,
}

impl AgentTraits {
    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.push(skill.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// An autonomous agent in the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Current economic balance; non-negative.
    pub balance: f64,
    /// Age in days since creation or replication.
    pub age_days: u32,
    /// Normalised fitness components.
    pub fitness: AgentFitness,
    /// Liveness state.
    pub liveness: LivenessState,
    /// Declared skills and tools.
    pub traits: AgentTraits,
    /// Completed operations, a proxy for experience.
    pub experience: u32,
    /// Subtasks currently assigned.
    pub current_load: usize,
    /// When the agent was created.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, balance: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            balance: balance.max(0.0),
            age_days: 0,
            fitness: AgentFitness::default(),
            liveness: LivenessState::Alive,
            traits: AgentTraits::default(),
            experience: 0,
            current_load: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_traits(mut self, traits: AgentTraits) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_fitness(mut self, fitness: AgentFitness) -> Self {
        self.fitness = fitness;
        self
    }

    pub fn with_experience(mut self, experience: u32) -> Self {
        self.experience = experience;
        self
    }

    /// Survival tier derived from the current balance.
    pub fn tier(&self) -> SurvivalTier {
        tier_of(self.balance)
    }

    /// Load band derived from the current balance.
    pub fn vitality(&self) -> VitalityBand {
        VitalityBand::from_balance(self.balance)
    }

    /// Whether this agent can accept another subtask.
    pub fn has_capacity(&self) -> bool {
        self.liveness == LivenessState::Alive && self.current_load < self.vitality().max_load()
    }

    /// Apply a turn's balance delta, clamping at zero. A balance that
    /// drops into the dead tier terminates the agent.
    pub fn settle(&mut self, delta: f64) {
        self.balance = (self.balance + delta).max(0.0);
        if self.tier().is_dead() {
            self.liveness = LivenessState::Dead;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.liveness == LivenessState::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_clamps_at_zero() {
        let agent = Agent::new("worker-1", -5.0);
        assert_eq!(agent.balance, 0.0);
    }

    #[test]
    fn settle_terminates_on_dead_tier() {
        let mut agent = Agent::new("worker-1", 1.0);
        assert!(agent.is_alive());
        agent.settle(-0.999);
        assert_eq!(agent.liveness, LivenessState::Dead);
    }

    #[test]
    fn vitality_caps_load() {
        let mut agent = Agent::new("worker-1", 0.5);
        assert_eq!(agent.vitality().max_load(), 2);
        agent.current_load = 2;
        assert!(!agent.has_capacity());
        agent.current_load = 1;
        assert!(agent.has_capacity());
    }

    #[test]
    fn vitality_bands() {
        assert_eq!(VitalityBand::from_balance(15.0), VitalityBand::Flourishing);
        assert_eq!(VitalityBand::from_balance(2.0), VitalityBand::Thriving);
        assert_eq!(VitalityBand::from_balance(0.2), VitalityBand::Surviving);
        assert_eq!(VitalityBand::from_balance(0.001), VitalityBand::Struggling);
        assert_eq!(VitalityBand::from_balance(15.0).max_load(), 5);
    }

    #[test]
    fn overall_fitness_is_component_mean() {
        let fitness = AgentFitness {
            survival: 1.0,
            earnings: 0.5,
            offspring: 0.0,
            adaptation: 0.5,
            innovation: 0.5,
        };
        assert!((fitness.overall() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn dormant_agent_has_no_capacity() {
        let mut agent = Agent::new("worker-1", 5.0);
        agent.liveness = LivenessState::Dormant;
        assert!(!agent.has_capacity());
    }
}
