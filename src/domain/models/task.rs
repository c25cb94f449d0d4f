//! Task domain model.
//!
//! A complex task decomposes into subtasks that form a dependency DAG.
//! The swarm coordinator exclusively owns subtask mutation for a task
//! while it executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::role::AgentRole;

/// A complex task submitted to the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexTask {
    /// Caller-supplied identifier.
    pub id: String,
    /// What the task is about; drives role hints during decomposition.
    pub description: String,
    /// Requirements; each must be addressed by at least one subtask.
    pub requirements: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ComplexTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            requirements: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }
}

/// Status of a subtask in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    /// Defined, not yet started.
    Pending,
    /// Executing; requires an assigned agent.
    InProgress,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl Default for SubTaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [SubTaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// One unit of work inside a complex task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Identifier, unique within the parent task.
    pub id: String,
    pub description: String,
    /// Ids of subtasks that must complete first; all resolve locally.
    pub dependencies: Vec<String>,
    /// Role this subtask calls for, set during decomposition or assignment.
    pub required_role: Option<AgentRole>,
    /// Executing agent; set when work starts.
    pub assigned_agent_id: Option<Uuid>,
    pub status: SubTaskStatus,
    /// Present iff completed.
    pub result: Option<Value>,
    /// Present iff failed.
    pub error: Option<String>,
}

impl SubTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            required_role: None,
            assigned_agent_id: None,
            status: SubTaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.required_role = Some(role);
        self
    }

    fn transition(&mut self, to: SubTaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Move to in_progress under the given agent.
    pub fn start(&mut self, agent_id: Uuid) -> DomainResult<()> {
        self.transition(SubTaskStatus::InProgress)?;
        self.assigned_agent_id = Some(agent_id);
        Ok(())
    }

    /// Terminal success; records the result.
    pub fn complete(&mut self, result: Value) -> DomainResult<()> {
        self.transition(SubTaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Terminal failure; records the error.
    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition(SubTaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// Record of a multi-agent collaboration on one task. Immutable except
/// for the completion triple, written once at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationRecord {
    pub id: Uuid,
    pub task_id: String,
    /// At least two unique participants, coordinator included.
    pub participant_ids: Vec<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub output: Option<Value>,
}

impl CollaborationRecord {
    pub fn open(task_id: impl Into<String>, participant_ids: Vec<Uuid>) -> DomainResult<Self> {
        let mut unique = participant_ids.clone();
        unique.sort();
        unique.dedup();
        if unique.len() < 2 {
            return Err(DomainError::InvalidInput(
                "collaboration requires at least 2 unique participants".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            participant_ids: unique,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            output: None,
        })
    }

    /// Write the completion triple. Rejects a second finalisation.
    pub fn finalize(&mut self, success: bool, output: Option<Value>) -> DomainResult<()> {
        if self.completed_at.is_some() {
            return Err(DomainError::PreconditionFailed(
                "collaboration already finalized".to_string(),
            ));
        }
        let now = Utc::now();
        self.completed_at = Some(now.max(self.started_at));
        self.success = Some(success);
        self.output = output;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subtask_happy_path() {
        let mut sub = SubTask::new("t1:sub:0", "collect prices");
        let agent = Uuid::new_v4();

        sub.start(agent).unwrap();
        assert_eq!(sub.status, SubTaskStatus::InProgress);
        assert_eq!(sub.assigned_agent_id, Some(agent));

        sub.complete(json!({"ok": true})).unwrap();
        assert_eq!(sub.status, SubTaskStatus::Completed);
        assert!(sub.result.is_some());
        assert!(sub.error.is_none());
    }

    #[test]
    fn subtask_failure_records_error() {
        let mut sub = SubTask::new("t1:sub:0", "collect prices");
        sub.start(Uuid::new_v4()).unwrap();
        sub.fail("upstream unreachable").unwrap();
        assert_eq!(sub.status, SubTaskStatus::Failed);
        assert_eq!(sub.error.as_deref(), Some("upstream unreachable"));
    }

    #[test]
    fn completing_a_pending_subtask_is_rejected() {
        let mut sub = SubTask::new("t1:sub:0", "x");
        let err = sub.complete(json!(null)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut sub = SubTask::new("t1:sub:0", "x");
        sub.start(Uuid::new_v4()).unwrap();
        sub.complete(json!(1)).unwrap();
        assert!(sub.start(Uuid::new_v4()).is_err());
        assert!(sub.fail("late").is_err());
    }

    #[test]
    fn collaboration_requires_two_participants() {
        let solo = CollaborationRecord::open("t1", vec![Uuid::new_v4()]);
        assert!(solo.is_err());

        let a = Uuid::new_v4();
        let duplicated = CollaborationRecord::open("t1", vec![a, a]);
        assert!(duplicated.is_err());
    }

    #[test]
    fn collaboration_finalizes_once() {
        let mut collab =
            CollaborationRecord::open("t1", vec![Uuid::new_v4(), Uuid::new_v4()]).unwrap();
        assert!(collab.is_open());

        collab.finalize(true, Some(json!(["done"]))).unwrap();
        assert!(!collab.is_open());
        assert!(collab.completed_at.unwrap() >= collab.started_at);

        let err = collab.finalize(false, None).unwrap_err();
        assert!(matches!(err, DomainError::PreconditionFailed(_)));
    }
}
