//! Subtask dependency DAG.
//!
//! Topological ordering, cycle detection, and ready-set selection over
//! the subtasks of one complex task. Cycles are tolerated rather than
//! fatal: cyclic nodes are scheduled as if they had no dependencies and
//! the cycle is surfaced to the caller for reporting.

use std::collections::{HashMap, HashSet, VecDeque};

use super::task::{SubTask, SubTaskStatus};

/// Dependency graph over the subtasks of a single task.
#[derive(Debug, Clone)]
pub struct SubtaskDag {
    /// Dependencies per node, restricted to ids present in the task.
    dependencies: HashMap<String, Vec<String>>,
    /// Reverse edges.
    dependents: HashMap<String, Vec<String>>,
}

/// Result of a tolerant topological sort.
#[derive(Debug, Clone)]
pub struct TopoOrder {
    /// Every subtask id, dependencies before dependents. Cyclic nodes
    /// appear after the acyclic ones, ordered by id.
    pub order: Vec<String>,
    /// Ids participating in a dependency cycle, ordered by id. Empty for
    /// a well-formed DAG.
    pub cyclic: Vec<String>,
}

impl SubtaskDag {
    /// Build the graph from a task's subtasks. Dependency ids that do not
    /// resolve within the list are ignored, matching the store of record.
    pub fn from_subtasks(subtasks: &[SubTask]) -> Self {
        let ids: HashSet<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for sub in subtasks {
            let deps: Vec<String> = sub
                .dependencies
                .iter()
                .filter(|d| ids.contains(d.as_str()))
                .cloned()
                .collect();
            for dep in &deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(sub.id.clone());
            }
            dependencies.insert(sub.id.clone(), deps);
        }

        Self {
            dependencies,
            dependents,
        }
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Whether every dependency edge is satisfiable without a cycle.
    pub fn has_cycle(&self) -> bool {
        !self.topological_sort().cyclic.is_empty()
    }

    /// Kahn's algorithm with cycle tolerance. Nodes left with unmet
    /// in-degree after the queue drains form the cyclic remainder; they
    /// are appended as if root-free so execution can still proceed.
    pub fn topological_sort(&self) -> TopoOrder {
        let mut in_degree: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = {
            let mut roots: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &d)| d == 0)
                .map(|(&id, _)| id)
                .collect();
            roots.sort_unstable();
            roots.into()
        };

        let mut order = Vec::with_capacity(self.dependencies.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(children) = self.dependents.get(id) {
                let mut unlocked: Vec<&str> = Vec::new();
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            unlocked.push(child.as_str());
                        }
                    }
                }
                unlocked.sort_unstable();
                queue.extend(unlocked);
            }
        }

        let mut cyclic: Vec<String> = self
            .dependencies
            .keys()
            .filter(|id| !order.contains(id))
            .cloned()
            .collect();
        cyclic.sort_unstable();
        order.extend(cyclic.iter().cloned());

        TopoOrder { order, cyclic }
    }

    /// Pending subtasks whose dependencies are all completed. Cyclic
    /// nodes count as ready, their dependencies disregarded.
    pub fn ready_ids(&self, subtasks: &[SubTask]) -> Vec<String> {
        let cyclic: HashSet<&str> = {
            let topo = self.topological_sort();
            subtasks
                .iter()
                .filter(|s| topo.cyclic.contains(&s.id))
                .map(|s| s.id.as_str())
                .collect()
        };
        let completed: HashSet<&str> = subtasks
            .iter()
            .filter(|s| s.status == SubTaskStatus::Completed)
            .map(|s| s.id.as_str())
            .collect();

        let mut ready: Vec<String> = subtasks
            .iter()
            .filter(|s| s.status == SubTaskStatus::Pending)
            .filter(|s| {
                cyclic.contains(s.id.as_str())
                    || self
                        .dependencies
                        .get(&s.id)
                        .map_or(true, |deps| deps.iter().all(|d| completed.contains(d.as_str())))
            })
            .map(|s| s.id.clone())
            .collect();
        ready.sort_unstable();
        ready
    }
}
