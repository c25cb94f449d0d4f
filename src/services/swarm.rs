//! Swarm coordinator.
//!
//! Drives one complex task end to end: decompose, assign, publish to
//! shared memory, execute the subtask DAG (parallel by default), then
//! synthesise the results and close the collaboration. The coordinator
//! is the single writer for a task's subtasks while it runs; errors are
//! collected into the result, never thrown through the public op.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Agent, CollaborationRecord, ComplexTask, MemoryMetadata, SubTask, SubTaskStatus, SubtaskDag,
};
use crate::domain::ports::{ChatMessage, ChatOptions, InferenceClient, SharedMemoryStore};

use super::assignment::{assign_subtasks, AssignmentStrategy};
use super::decomposition::decompose;
use super::retry::{CancelSignal, FibonacciRetry};

/// How subtasks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Ready subtasks run concurrently, dependencies respected.
    Parallel,
    /// One ready subtask at a time, to completion.
    Sequential,
}

/// How completed results are folded into one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStrategy {
    /// Ordered list of results, by subtask id.
    Concatenate,
    /// Objects spread-merge in completion order; scalars last-wins.
    Merge,
    /// Mode of equal-compared results.
    Vote,
    /// Numeric mean with equal weights.
    WeightedAverage,
}

/// Which result survives when several subtasks share a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    First,
    Last,
    Majority,
}

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub execution_mode: ExecutionMode,
    pub synthesis: SynthesisStrategy,
    /// Collapse same-description results before synthesis when set.
    pub conflict_resolution: Option<ConflictResolution>,
    pub assignment: AssignmentStrategy,
    /// Additional attempts per subtask beyond the first.
    pub max_retries: u32,
    /// Fixed delay between subtask attempts.
    pub retry_delay: Duration,
    /// Whole-run budget; firing fails the run with a timeout error.
    pub global_timeout: Duration,
    /// Scheduling tick floor to avoid busy spinning.
    pub tick_debounce: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Parallel,
            synthesis: SynthesisStrategy::Concatenate,
            conflict_resolution: None,
            assignment: AssignmentStrategy::BestMatch,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            global_timeout: Duration::from_secs(300),
            tick_debounce: Duration::from_millis(100),
        }
    }
}

/// Executes one subtask on behalf of an assigned agent.
#[async_trait]
pub trait SubtaskRunner: Send + Sync {
    async fn run(&self, subtask: &SubTask, agent: &Agent) -> DomainResult<Value>;
}

/// Runner backed by the inference client; the agent's survival tier
/// picks the model it is allowed to call.
pub struct InferenceSubtaskRunner {
    client: Arc<dyn InferenceClient>,
}

impl InferenceSubtaskRunner {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubtaskRunner for InferenceSubtaskRunner {
    async fn run(&self, subtask: &SubTask, agent: &Agent) -> DomainResult<Value> {
        let tier = agent.tier();
        if tier.is_dead() {
            return Err(DomainError::PreconditionFailed(format!(
                "agent {} has no inference capability in tier {}",
                agent.name, tier
            )));
        }
        let response = self
            .client
            .chat(
                &[ChatMessage::user(subtask.description.clone())],
                ChatOptions {
                    model: Some(tier.model_id().to_string()),
                    ..ChatOptions::default()
                },
            )
            .await?;
        Ok(json!({
            "message": response.message,
            "model": response.model,
            "total_tokens": response.usage.total_tokens,
        }))
    }
}

/// Outcome of one coordinated swarm run.
#[derive(Debug, Clone)]
pub struct SwarmResult {
    pub task_id: String,
    /// True iff every subtask completed.
    pub success: bool,
    /// Results of completed subtasks, keyed and ordered by subtask id.
    pub subtask_results: BTreeMap<String, Value>,
    /// Synthesised output; present when at least one subtask completed.
    pub output: Option<Value>,
    /// Collected failures; non-empty iff at least one subtask failed.
    pub errors: Vec<String>,
    /// Closed collaboration record; absent when the run failed before
    /// any agent was enlisted.
    pub collaboration: Option<CollaborationRecord>,
    pub duration_ms: u64,
}

pub struct SwarmCoordinator {
    memory: Arc<dyn SharedMemoryStore>,
    runner: Arc<dyn SubtaskRunner>,
    retry: FibonacciRetry,
    config: SwarmConfig,
}

impl SwarmCoordinator {
    pub fn new(
        memory: Arc<dyn SharedMemoryStore>,
        runner: Arc<dyn SubtaskRunner>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            memory,
            runner,
            retry: FibonacciRetry::default(),
            config,
        }
    }

    /// Coordinate a complex task across the agent pool: decompose it,
    /// then drive the resulting DAG.
    pub async fn coordinate(
        &self,
        task: &ComplexTask,
        agents: &mut Vec<Agent>,
        coordinator_id: Uuid,
        cancel: Option<CancelSignal>,
    ) -> SwarmResult {
        let subtasks = match decompose(task) {
            Ok(subtasks) => subtasks,
            Err(err) => {
                return self.failed_result(task, err.to_string(), Instant::now());
            }
        };
        self.coordinate_subtasks(task, subtasks, agents, coordinator_id, cancel)
            .await
    }

    /// Drive an already-decomposed subtask DAG for a task.
    pub async fn coordinate_subtasks(
        &self,
        task: &ComplexTask,
        mut subtasks: Vec<SubTask>,
        agents: &mut Vec<Agent>,
        coordinator_id: Uuid,
        cancel: Option<CancelSignal>,
    ) -> SwarmResult {
        let started = Instant::now();
        info!(task_id = %task.id, subtasks = subtasks.len(), "starting swarm coordination");

        let mut errors: Vec<String> = Vec::new();
        let report = assign_subtasks(&mut subtasks, agents, self.config.assignment);
        for cyclic in &report.cyclic {
            errors.push(format!(
                "Dependency cycle detected involving subtask: {cyclic}"
            ));
        }
        if report.assigned.is_empty() {
            return self.failed_result(
                task,
                "no agents available for assignment".to_string(),
                started,
            );
        }

        let agent_index: HashMap<Uuid, Agent> =
            agents.iter().map(|a| (a.id, a.clone())).collect();

        self.publish_plan(task, &subtasks).await;

        let mut participants: Vec<Uuid> = report.assigned.iter().map(|(_, id)| *id).collect();
        participants.push(coordinator_id);
        let mut collaboration = match CollaborationRecord::open(task.id.clone(), participants) {
            Ok(record) => record,
            Err(err) => {
                return self.failed_result(task, err.to_string(), started);
            }
        };

        let mut completion_order: Vec<String> = Vec::new();
        let execution_error = match self.config.execution_mode {
            ExecutionMode::Parallel => {
                self.execute_parallel(
                    task,
                    &mut subtasks,
                    &agent_index,
                    &mut completion_order,
                    cancel,
                )
                .await
            }
            ExecutionMode::Sequential => {
                self.execute_sequential(task, &mut subtasks, &agent_index, &mut completion_order)
                    .await
            }
        };

        if let Some(err) = execution_error {
            errors.push(err);
        }
        for sub in &subtasks {
            if let Some(error) = &sub.error {
                errors.push(format!("{}: {error}", sub.id));
            }
        }

        let subtask_results: BTreeMap<String, Value> = subtasks
            .iter()
            .filter(|s| s.status == SubTaskStatus::Completed)
            .filter_map(|s| s.result.clone().map(|r| (s.id.clone(), r)))
            .collect();

        let success = !subtasks.is_empty()
            && subtasks
                .iter()
                .all(|s| s.status == SubTaskStatus::Completed)
            && errors.is_empty();

        let output = if subtask_results.is_empty() {
            None
        } else {
            Some(self.synthesize(&subtasks, &completion_order))
        };

        if let Err(err) = collaboration.finalize(success, output.clone()) {
            warn!(task_id = %task.id, error = %err, "failed to finalize collaboration");
        }
        let collaboration = Some(collaboration);

        info!(
            task_id = %task.id,
            success,
            completed = subtask_results.len(),
            failed = errors.len(),
            "swarm coordination finished"
        );

        SwarmResult {
            task_id: task.id.clone(),
            success,
            subtask_results,
            output,
            errors,
            collaboration,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed_result(
        &self,
        task: &ComplexTask,
        error: String,
        started: Instant,
    ) -> SwarmResult {
        SwarmResult {
            task_id: task.id.clone(),
            success: false,
            subtask_results: BTreeMap::new(),
            output: None,
            errors: vec![error],
            collaboration: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Publish the plan under the task's namespace. Publishing rides the
    /// retry engine; a store outage degrades observability, not the run.
    async fn publish_plan(&self, task: &ComplexTask, subtasks: &[SubTask]) {
        let key = format!("swarm:{}", task.id);
        let assignments: Vec<Value> = subtasks
            .iter()
            .map(|s| {
                json!({
                    "subtask_id": s.id,
                    "agent_id": s.assigned_agent_id,
                    "role": s.required_role.map(|r| r.as_str()),
                })
            })
            .collect();
        let value = json!({
            "task": task,
            "subtasks": subtasks,
            "assignments": assignments,
        });
        let metadata = MemoryMetadata::default()
            .with_context(key.clone())
            .with_tag("swarm-plan");

        let outcome = self
            .retry
            .execute(|_| {
                let value = value.clone();
                let metadata = metadata.clone();
                let key = key.clone();
                async move { self.memory.store(&key, value, metadata, None, None).await }
            })
            .await;
        if let Err(err) = outcome.result {
            warn!(task_id = %task.id, error = %err, "failed to publish swarm plan");
        }
    }

    /// Persist one subtask result under the task namespace.
    async fn persist_result(&self, task_id: &str, subtask_id: &str, result: &Value) {
        let key = format!("swarm:{task_id}:result:{subtask_id}");
        let metadata = MemoryMetadata::default()
            .with_context(format!("swarm:{task_id}"))
            .with_tag("subtask-result");
        let outcome = self
            .retry
            .execute(|_| {
                let key = key.clone();
                let value = result.clone();
                let metadata = metadata.clone();
                async move { self.memory.store(&key, value, metadata, None, None).await }
            })
            .await;
        if let Err(err) = outcome.result {
            warn!(subtask_id, error = %err, "failed to persist subtask result");
        }
    }

    /// Run one subtask with the fixed-delay retry budget.
    async fn attempt_subtask(
        runner: Arc<dyn SubtaskRunner>,
        subtask: SubTask,
        agent: Agent,
        max_retries: u32,
        retry_delay: Duration,
    ) -> (String, Result<Value, String>) {
        let mut last_error = String::new();
        for attempt in 0..=max_retries {
            if attempt > 0 {
                sleep(retry_delay).await;
            }
            match runner.run(&subtask, &agent).await {
                Ok(value) => return (subtask.id, Ok(value)),
                Err(err) => {
                    debug!(subtask_id = %subtask.id, attempt, error = %err, "subtask attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        (subtask.id, Err(last_error))
    }

    async fn execute_parallel(
        &self,
        task: &ComplexTask,
        subtasks: &mut [SubTask],
        agents: &HashMap<Uuid, Agent>,
        completion_order: &mut Vec<String>,
        cancel: Option<CancelSignal>,
    ) -> Option<String> {
        let deadline = Instant::now() + self.config.global_timeout;
        let dag = SubtaskDag::from_subtasks(subtasks);
        let mut join_set: JoinSet<(String, Result<Value, String>)> = JoinSet::new();

        loop {
            if let Some(cancel) = &cancel {
                if *cancel.borrow() {
                    join_set.abort_all();
                    return Some("Swarm execution cancelled".to_string());
                }
            }

            // Launch everything whose dependencies are met.
            for ready_id in dag.ready_ids(subtasks) {
                let Some(sub) = subtasks.iter_mut().find(|s| s.id == ready_id) else {
                    continue;
                };
                let Some(agent_id) = sub.assigned_agent_id else {
                    let _ = sub.start(Uuid::nil());
                    let _ = sub.fail("no agent assigned");
                    continue;
                };
                let Some(agent) = agents.get(&agent_id) else {
                    let _ = sub.start(agent_id);
                    let _ = sub.fail("assigned agent not in pool");
                    continue;
                };
                if sub.start(agent_id).is_err() {
                    continue;
                }
                join_set.spawn(Self::attempt_subtask(
                    Arc::clone(&self.runner),
                    sub.clone(),
                    agent.clone(),
                    self.config.max_retries,
                    self.config.retry_delay,
                ));
            }

            let all_terminal = subtasks.iter().all(|s| s.status.is_terminal());
            if all_terminal {
                return None;
            }

            if join_set.is_empty() {
                // Nothing running and nothing ready: the remaining
                // pending subtasks sit behind failed dependencies.
                for sub in subtasks.iter_mut() {
                    if sub.status == SubTaskStatus::Pending {
                        let _ = sub.start(sub.assigned_agent_id.unwrap_or_else(Uuid::nil));
                        let _ = sub.fail("unmet dependencies");
                    }
                }
                return None;
            }

            // Wait for a completion, the debounce tick, or the deadline.
            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok((subtask_id, result))) => {
                            self.settle_subtask(task, subtasks, &subtask_id, result, completion_order)
                                .await;
                        }
                        Some(Err(join_err)) => {
                            warn!(error = %join_err, "subtask worker panicked");
                        }
                        None => {}
                    }
                }
                () = sleep(self.config.tick_debounce) => {}
                () = tokio::time::sleep_until(deadline) => {
                    join_set.abort_all();
                    return Some("Swarm execution timeout".to_string());
                }
            }

            if Instant::now() >= deadline {
                join_set.abort_all();
                return Some("Swarm execution timeout".to_string());
            }
        }
    }

    async fn execute_sequential(
        &self,
        task: &ComplexTask,
        subtasks: &mut [SubTask],
        agents: &HashMap<Uuid, Agent>,
        completion_order: &mut Vec<String>,
    ) -> Option<String> {
        let deadline = Instant::now() + self.config.global_timeout;
        let dag = SubtaskDag::from_subtasks(subtasks);

        loop {
            if subtasks.iter().all(|s| s.status.is_terminal()) {
                return None;
            }
            if Instant::now() >= deadline {
                return Some("Swarm execution timeout".to_string());
            }

            let ready = dag.ready_ids(subtasks);
            let Some(next_id) = ready.first().cloned() else {
                if subtasks.iter().any(|s| s.status == SubTaskStatus::Pending) {
                    return Some("Deadlock detected".to_string());
                }
                return None;
            };

            let Some(sub) = subtasks.iter_mut().find(|s| s.id == next_id) else {
                continue;
            };
            let Some(agent_id) = sub.assigned_agent_id else {
                let _ = sub.start(Uuid::nil());
                let _ = sub.fail("no agent assigned");
                continue;
            };
            let Some(agent) = agents.get(&agent_id) else {
                let _ = sub.start(agent_id);
                let _ = sub.fail("assigned agent not in pool");
                continue;
            };
            if sub.start(agent_id).is_err() {
                continue;
            }

            let (subtask_id, result) = Self::attempt_subtask(
                Arc::clone(&self.runner),
                sub.clone(),
                agent.clone(),
                self.config.max_retries,
                self.config.retry_delay,
            )
            .await;
            self.settle_subtask(task, subtasks, &subtask_id, result, completion_order)
                .await;
        }
    }

    async fn settle_subtask(
        &self,
        task: &ComplexTask,
        subtasks: &mut [SubTask],
        subtask_id: &str,
        result: Result<Value, String>,
        completion_order: &mut Vec<String>,
    ) {
        let Some(sub) = subtasks.iter_mut().find(|s| s.id == subtask_id) else {
            return;
        };
        match result {
            Ok(value) => {
                if sub.complete(value.clone()).is_ok() {
                    completion_order.push(sub.id.clone());
                    self.persist_result(&task.id, subtask_id, &value).await;
                }
            }
            Err(error) => {
                let _ = sub.fail(error);
            }
        }
    }

    /// Fold completed results into one output per the configured
    /// strategy, after optional conflict resolution across subtasks
    /// sharing a description.
    fn synthesize(&self, subtasks: &[SubTask], completion_order: &[String]) -> Value {
        let completed: Vec<&SubTask> = {
            let mut by_completion: Vec<&SubTask> = completion_order
                .iter()
                .filter_map(|id| subtasks.iter().find(|s| &s.id == id))
                .collect();
            // Completions persisted out of band still count.
            for sub in subtasks {
                if sub.status == SubTaskStatus::Completed
                    && !by_completion.iter().any(|s| s.id == sub.id)
                {
                    by_completion.push(sub);
                }
            }
            by_completion
        };

        let resolved: Vec<(&SubTask, Value)> = match self.config.conflict_resolution {
            None => completed
                .iter()
                .filter_map(|s| s.result.clone().map(|r| (*s, r)))
                .collect(),
            Some(policy) => resolve_conflicts(&completed, policy),
        };

        match self.config.synthesis {
            SynthesisStrategy::Concatenate => {
                let mut ordered: Vec<(&str, Value)> = resolved
                    .iter()
                    .map(|(s, v)| (s.id.as_str(), v.clone()))
                    .collect();
                ordered.sort_by(|a, b| a.0.cmp(b.0));
                Value::Array(ordered.into_iter().map(|(_, v)| v).collect())
            }
            SynthesisStrategy::Merge => {
                let mut merged = Map::new();
                let mut last_scalar = Value::Null;
                let mut saw_object = false;
                for (_, value) in &resolved {
                    if let Value::Object(object) = value {
                        saw_object = true;
                        for (k, v) in object {
                            merged.insert(k.clone(), v.clone());
                        }
                    } else {
                        last_scalar = value.clone();
                    }
                }
                if saw_object {
                    Value::Object(merged)
                } else {
                    last_scalar
                }
            }
            SynthesisStrategy::Vote => {
                let mut counts: Vec<(Value, usize)> = Vec::new();
                for (_, value) in &resolved {
                    match counts.iter_mut().find(|(v, _)| v == value) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((value.clone(), 1)),
                    }
                }
                counts
                    .into_iter()
                    .max_by_key(|(_, n)| *n)
                    .map_or(Value::Null, |(v, _)| v)
            }
            SynthesisStrategy::WeightedAverage => {
                let numbers: Vec<f64> = resolved
                    .iter()
                    .filter_map(|(_, v)| v.as_f64())
                    .collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    json!(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
        }
    }
}

/// Collapse same-description groups to one representative result each,
/// preserving completion order across groups.
fn resolve_conflicts<'a>(
    completed: &[&'a SubTask],
    policy: ConflictResolution,
) -> Vec<(&'a SubTask, Value)> {
    let mut groups: Vec<(&str, Vec<&'a SubTask>)> = Vec::new();
    for &sub in completed {
        match groups.iter_mut().find(|(d, _)| *d == sub.description) {
            Some((_, members)) => members.push(sub),
            None => groups.push((sub.description.as_str(), vec![sub])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(_, members)| {
            let chosen = match policy {
                ConflictResolution::First => members.first().copied(),
                ConflictResolution::Last => members.last().copied(),
                ConflictResolution::Majority => {
                    let mut counts: Vec<(&Value, usize, &&SubTask)> = Vec::new();
                    for member in &members {
                        if let Some(result) = &member.result {
                            match counts.iter_mut().find(|(v, _, _)| *v == result) {
                                Some((_, n, _)) => *n += 1,
                                None => counts.push((result, 1, member)),
                            }
                        }
                    }
                    counts
                        .into_iter()
                        .max_by_key(|(_, n, _)| *n)
                        .map(|(_, _, s)| *s)
                }
            };
            chosen.and_then(|s| s.result.clone().map(|r| (s, r)))
        })
        .collect()
}
