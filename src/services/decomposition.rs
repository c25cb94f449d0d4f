//! Complex task decomposition.
//!
//! Turns a complex task into a validated subtask DAG: one analysis
//! entry point, one subtask per requirement, and a synthesis step once
//! the graph grows past a handful of nodes. Decomposition is
//! deterministic for a given description and requirements ordering.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRole, ComplexTask, SubTask, SubtaskDag};

/// Derive a role hint from free-form description keywords.
pub fn role_hint_for(description: &str) -> AgentRole {
    let lowered = description.to_lowercase();
    if lowered.contains("trade") || lowered.contains("swap") || lowered.contains("market") {
        AgentRole::Trader
    } else if lowered.contains("implement")
        || lowered.contains("code")
        || lowered.contains("build")
        || lowered.contains("debug")
    {
        AgentRole::Coder
    } else if lowered.contains("coordinate")
        || lowered.contains("synthesize")
        || lowered.contains("aggregate")
    {
        AgentRole::Coordinator
    } else {
        AgentRole::Researcher
    }
}

/// Decompose a complex task into its subtask DAG.
///
/// Shape: an analysis entry point; one subtask per requirement hanging
/// off it; a coordinator-run synthesis node when more than one
/// requirement fans out. Every requirement string is embedded in its
/// subtask's description.
pub fn decompose(task: &ComplexTask) -> DomainResult<Vec<SubTask>> {
    if task.description.trim().is_empty() {
        return Err(DomainError::InvalidInput(
            "task description cannot be empty".to_string(),
        ));
    }

    let sub_id = |n: usize| format!("{}:sub:{n}", task.id);
    let mut subtasks = Vec::new();

    if task.requirements.is_empty() {
        let mut only = SubTask::new(sub_id(0), task.description.clone());
        only.required_role = Some(role_hint_for(&task.description));
        subtasks.push(only);
        validate(&subtasks)?;
        return Ok(subtasks);
    }

    let analysis_id = sub_id(0);
    let mut analysis = SubTask::new(
        analysis_id.clone(),
        format!("Analyze task and plan approach: {}", task.description),
    );
    analysis.required_role = Some(AgentRole::Researcher);
    subtasks.push(analysis);

    let mut requirement_ids = Vec::new();
    for (i, requirement) in task.requirements.iter().enumerate() {
        let id = sub_id(i + 1);
        let mut sub = SubTask::new(id.clone(), format!("Address requirement: {requirement}"))
            .depends_on(analysis_id.clone());
        sub.required_role = Some(role_hint_for(requirement));
        requirement_ids.push(id);
        subtasks.push(sub);
    }

    if task.requirements.len() > 1 {
        let mut synthesis = SubTask::new(
            sub_id(task.requirements.len() + 1),
            format!("Synthesize results for: {}", task.description),
        );
        for id in &requirement_ids {
            synthesis = synthesis.depends_on(id.clone());
        }
        synthesis.required_role = Some(AgentRole::Coordinator);
        subtasks.push(synthesis);
    }

    validate(&subtasks)?;
    Ok(subtasks)
}

/// Structural checks on a decomposition: non-empty, unique ids, local
/// dependencies, at least one entry point, and no cycles.
pub fn validate(subtasks: &[SubTask]) -> DomainResult<()> {
    if subtasks.is_empty() {
        return Err(DomainError::InvalidInput(
            "decomposition produced no subtasks".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for sub in subtasks {
        if !seen.insert(sub.id.as_str()) {
            return Err(DomainError::InvalidInput(format!(
                "duplicate subtask id: {}",
                sub.id
            )));
        }
    }

    for sub in subtasks {
        for dep in &sub.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(DomainError::SubtaskNotFound(dep.clone()));
            }
        }
    }

    if !subtasks.iter().any(|s| s.dependencies.is_empty()) {
        return Err(DomainError::InvalidInput(
            "decomposition has no entry point".to_string(),
        ));
    }

    let dag = SubtaskDag::from_subtasks(subtasks);
    let topo = dag.topological_sort();
    if let Some(first) = topo.cyclic.first() {
        return Err(DomainError::DependencyCycle(first.clone()));
    }

    Ok(())
}
