//! Role specialisation domain model.
//!
//! Four closed role variants plus a metadata record per role. Suitability
//! scoring against these profiles lives in the assignment service.

use serde::{Deserialize, Serialize};

/// Specialised role an agent can fill inside a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Researcher,
    Coder,
    Trader,
    Coordinator,
}

/// Enumeration order doubles as the deterministic tie-break order for
/// role selection.
pub const ROLE_ORDER: [AgentRole; 4] = [
    AgentRole::Researcher,
    AgentRole::Coder,
    AgentRole::Trader,
    AgentRole::Coordinator,
];

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Coder => "coder",
            Self::Trader => "trader",
            Self::Coordinator => "coordinator",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "researcher" => Some(Self::Researcher),
            "coder" => Some(Self::Coder),
            "trader" => Some(Self::Trader),
            "coordinator" => Some(Self::Coordinator),
            _ => None,
        }
    }

    /// Static profile for this role.
    pub fn profile(&self) -> &'static RoleProfile {
        match self {
            Self::Researcher => &RESEARCHER,
            Self::Coder => &CODER,
            Self::Trader => &TRADER,
            Self::Coordinator => &COORDINATOR,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requirements and preferences a role places on candidate agents.
#[derive(Debug, Clone, Serialize)]
pub struct RoleProfile {
    /// Capabilities an agent must declare for full capability credit.
    pub required_capabilities: &'static [&'static str],
    /// Tools that improve the fit when present.
    pub preferred_tools: &'static [&'static str],
    /// Completed operations expected for full experience credit.
    pub min_experience: u32,
    /// Optional overall fitness gate; below it, partial credit.
    pub min_fitness: Option<f64>,
}

static RESEARCHER: RoleProfile = RoleProfile {
    required_capabilities: &["search", "summarize", "analyze"],
    preferred_tools: &["web_search", "document_reader"],
    min_experience: 5,
    min_fitness: None,
};

static CODER: RoleProfile = RoleProfile {
    required_capabilities: &["code_generation", "debugging", "testing"],
    preferred_tools: &["code_interpreter", "repo_browser"],
    min_experience: 10,
    min_fitness: Some(0.4),
};

static TRADER: RoleProfile = RoleProfile {
    required_capabilities: &["market_analysis", "order_execution"],
    preferred_tools: &["exchange_client", "price_feed"],
    min_experience: 20,
    min_fitness: Some(0.5),
};

static COORDINATOR: RoleProfile = RoleProfile {
    required_capabilities: &["planning", "delegation", "synthesis"],
    preferred_tools: &["shared_memory"],
    min_experience: 15,
    min_fitness: Some(0.5),
};
