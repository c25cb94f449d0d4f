//! Role suitability scoring and subtask assignment.
//!
//! Suitability is a weighted fit in 0..1: experience 20, fitness 20,
//! capability match 40, tool match 20, each term scaled to its own
//! maximum. Assignment walks the subtask DAG in topological order and
//! places each pending subtask on a live agent with spare load.

use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::models::{Agent, AgentRole, SubTask, SubTaskStatus, SubtaskDag, ROLE_ORDER};

use super::decomposition::role_hint_for;

/// Score above which a preferred role is accepted without searching the
/// alternatives.
pub const PREFERRED_ROLE_THRESHOLD: f64 = 0.5;

/// Weighted agent-to-role fit in 0..1.
pub fn suitability(agent: &Agent, role: AgentRole) -> f64 {
    let profile = role.profile();

    let experience_term = if profile.min_experience == 0 {
        1.0
    } else {
        (f64::from(agent.experience) / f64::from(profile.min_experience)).min(1.0)
    };

    let fitness_term = match profile.min_fitness {
        Some(gate) if gate > 0.0 => (agent.fitness.overall() / gate).min(1.0),
        _ => agent.fitness.overall().min(1.0),
    };

    let capability_term = fraction_present(profile.required_capabilities, &agent.traits.skills);
    let tool_term = fraction_present(profile.preferred_tools, &agent.traits.tools);

    (20.0 * experience_term + 20.0 * fitness_term + 40.0 * capability_term + 20.0 * tool_term)
        / 100.0
}

fn fraction_present(wanted: &[&str], held: &[String]) -> f64 {
    if wanted.is_empty() {
        return 1.0;
    }
    let hits = wanted
        .iter()
        .filter(|w| held.iter().any(|h| h == *w))
        .count();
    hits as f64 / wanted.len() as f64
}

/// Pick a role for the agent: the preferred one when it clears the
/// threshold, otherwise the argmax across all roles. Ties break on
/// enumeration order.
pub fn assign_role(agent: &Agent, preferred: Option<AgentRole>) -> (AgentRole, f64) {
    if let Some(preferred) = preferred {
        let score = suitability(agent, preferred);
        if score >= PREFERRED_ROLE_THRESHOLD {
            return (preferred, score);
        }
    }
    let mut best = (ROLE_ORDER[0], suitability(agent, ROLE_ORDER[0]));
    for role in &ROLE_ORDER[1..] {
        let score = suitability(agent, *role);
        if score > best.1 {
            best = (*role, score);
        }
    }
    best
}

/// How subtasks are spread across candidate agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStrategy {
    /// Highest suitability for the required role; ties break on agent id.
    BestMatch,
    /// Role-qualified candidate with the lowest current load.
    LoadBalanced,
    /// Role-qualified candidates in id order, lowest load first.
    RoundRobin,
}

impl Default for AssignmentStrategy {
    fn default() -> Self {
        Self::BestMatch
    }
}

/// Outcome of one assignment pass.
#[derive(Debug, Clone, Default)]
pub struct AssignmentReport {
    /// (subtask id, agent id) pairs placed this pass.
    pub assigned: Vec<(String, Uuid)>,
    /// Subtasks left pending with no capable agent.
    pub unassigned: Vec<String>,
    /// Subtask ids found on a dependency cycle, surfaced for reporting.
    pub cyclic: Vec<String>,
}

/// Assign pending subtasks to agents in dependency order, mutating both
/// sides: the subtask gets its agent and role, the agent's load rises.
pub fn assign_subtasks(
    subtasks: &mut [SubTask],
    agents: &mut [Agent],
    strategy: AssignmentStrategy,
) -> AssignmentReport {
    let dag = SubtaskDag::from_subtasks(subtasks);
    let topo = dag.topological_sort();
    let mut report = AssignmentReport {
        cyclic: topo.cyclic.clone(),
        ..AssignmentReport::default()
    };

    let index_by_id: HashMap<String, usize> = subtasks
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();

    for subtask_id in &topo.order {
        let Some(&idx) = index_by_id.get(subtask_id) else {
            continue;
        };
        if subtasks[idx].status != SubTaskStatus::Pending {
            continue;
        }

        let role = subtasks[idx]
            .required_role
            .unwrap_or_else(|| role_hint_for(&subtasks[idx].description));

        let chosen = select_agent(agents, role, strategy);
        match chosen {
            Some(agent_idx) => {
                let agent_id = agents[agent_idx].id;
                subtasks[idx].required_role = Some(role);
                subtasks[idx].assigned_agent_id = Some(agent_id);
                agents[agent_idx].current_load += 1;
                report.assigned.push((subtask_id.clone(), agent_id));
            }
            None => report.unassigned.push(subtask_id.clone()),
        }
    }

    report
}

fn select_agent(
    agents: &[Agent],
    role: AgentRole,
    strategy: AssignmentStrategy,
) -> Option<usize> {
    let available: Vec<usize> = agents
        .iter()
        .enumerate()
        .filter(|(_, a)| a.has_capacity())
        .map(|(i, _)| i)
        .collect();
    if available.is_empty() {
        return None;
    }

    // Role-qualified subset; all available agents when nobody qualifies.
    let qualified: Vec<usize> = {
        let passing: Vec<usize> = available
            .iter()
            .copied()
            .filter(|&i| suitability(&agents[i], role) >= PREFERRED_ROLE_THRESHOLD)
            .collect();
        if passing.is_empty() {
            available.clone()
        } else {
            passing
        }
    };

    match strategy {
        AssignmentStrategy::BestMatch => available.into_iter().min_by(|&a, &b| {
            let score_a = suitability(&agents[a], role);
            let score_b = suitability(&agents[b], role);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| agents[a].id.cmp(&agents[b].id))
        }),
        AssignmentStrategy::LoadBalanced => qualified.into_iter().min_by(|&a, &b| {
            agents[a]
                .current_load
                .cmp(&agents[b].current_load)
                .then_with(|| agents[a].id.cmp(&agents[b].id))
        }),
        AssignmentStrategy::RoundRobin => {
            let mut ordered = qualified;
            ordered.sort_by(|&a, &b| agents[a].id.cmp(&agents[b].id));
            ordered
                .into_iter()
                .min_by_key(|&i| agents[i].current_load)
        }
    }
}

/// One reassignment suggested by the rebalancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceMove {
    pub from: Uuid,
    pub to: Uuid,
}

/// Move excess assignments off overloaded agents (>1.5× average) onto
/// lighter ones, one at a time, until nobody sits above the bound.
/// Receivers are drawn from below the average, which covers the
/// underloaded set (<0.5× average). A balanced map yields no moves.
pub fn rebalance(loads: &mut HashMap<Uuid, usize>) -> Vec<RebalanceMove> {
    let mut moves = Vec::new();
    if loads.len() < 2 {
        return moves;
    }

    // Moves preserve the total, so the bounds are fixed for the pass.
    let total: usize = loads.values().sum();
    let average = total as f64 / loads.len() as f64;
    let high = average * 1.5;

    loop {
        let over = loads
            .iter()
            .filter(|(_, &l)| l as f64 > high)
            .max_by_key(|(id, &l)| (l, *id))
            .map(|(&id, _)| id);
        let under = loads
            .iter()
            .filter(|(_, &l)| (l as f64) < average)
            .min_by_key(|(id, &l)| (l, *id))
            .map(|(&id, _)| id);

        match (over, under) {
            (Some(from), Some(to)) if from != to => {
                if let Some(load) = loads.get_mut(&from) {
                    *load -= 1;
                }
                if let Some(load) = loads.get_mut(&to) {
                    *load += 1;
                }
                moves.push(RebalanceMove { from, to });
            }
            _ => break,
        }
    }

    moves
}
