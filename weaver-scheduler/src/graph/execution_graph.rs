use std::collections::{BTreeSet, HashMap};

use weaver_common::error::Error;
use weaver_common::task::{TaskExecutionStatus, TaskInstance};
use weaver_common::workflow::{TaskDefinition, WorkflowExecutionStatus};

/// One schedulable node of the runtime DAG: the defining task, the
/// task instance it resumes (if any), and nothing else. The dispatch
/// layer treats this as opaque.
#[derive(Clone, Debug)]
pub struct TaskExecutionRunnable {
    pub workflow_instance_id: i32,
    pub task_definition: TaskDefinition,
    pub task_instance: Option<TaskInstance>,
}

impl TaskExecutionRunnable {
    pub fn name(&self) -> &str {
        &self.task_definition.name
    }

    /// Current state: the seeded instance's state, or PENDING for a
    /// node that has never produced an instance.
    pub fn state(&self) -> TaskExecutionStatus {
        self.task_instance
            .as_ref()
            .map(|t| t.state)
            .unwrap_or(TaskExecutionStatus::Pending)
    }
}

/// Incrementally collects nodes during a topology walk, then seals into
/// an immutable `WorkflowExecutionGraph`. Successor hints may point at
/// tasks that end up excluded (e.g. already-successful tasks during
/// failure recovery); sealing drops those edges.
#[derive(Default)]
pub struct ExecutionGraphBuilder {
    nodes: HashMap<String, TaskExecutionRunnable>,
    successor_hints: HashMap<String, BTreeSet<String>>,
}

impl ExecutionGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        runnable: TaskExecutionRunnable,
        successors: &BTreeSet<String>,
    ) -> Result<(), Error> {
        let name = runnable.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(Error::Conflict(format!(
                "execution graph already contains node '{name}'"
            )));
        }
        self.successor_hints.insert(name.clone(), successors.clone());
        self.nodes.insert(name, runnable);
        Ok(())
    }

    pub fn build(self) -> WorkflowExecutionGraph {
        let mut edges: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut predecessors: HashMap<String, BTreeSet<String>> = HashMap::new();
        for name in self.nodes.keys() {
            edges.entry(name.clone()).or_default();
            predecessors.entry(name.clone()).or_default();
        }
        for (from, hints) in &self.successor_hints {
            for to in hints {
                if !self.nodes.contains_key(to) {
                    continue;
                }
                edges.get_mut(from).map(|s| s.insert(to.clone()));
                predecessors.get_mut(to).map(|s| s.insert(from.clone()));
            }
        }
        WorkflowExecutionGraph {
            nodes: self.nodes,
            edges,
            predecessors,
        }
    }
}

/// Runtime DAG of `TaskExecutionRunnable` nodes keyed by task name.
/// Edges are the static graph's edges restricted to the nodes actually
/// scheduled for this run. Read-mostly once built; owned by the
/// per-instance runnable.
#[derive(Debug)]
pub struct WorkflowExecutionGraph {
    nodes: HashMap<String, TaskExecutionRunnable>,
    edges: HashMap<String, BTreeSet<String>>,
    predecessors: HashMap<String, BTreeSet<String>>,
}

impl WorkflowExecutionGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.nodes.contains_key(task_name)
    }

    pub fn node(&self, task_name: &str) -> Option<&TaskExecutionRunnable> {
        self.nodes.get(task_name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskExecutionRunnable> {
        self.nodes.values()
    }

    pub fn successors(&self, task_name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(task_name)
    }

    pub fn predecessors(&self, task_name: &str) -> Option<&BTreeSet<String>> {
        self.predecessors.get(task_name)
    }

    /// Nodes with no predecessor inside this graph, in name order.
    pub fn start_nodes(&self) -> Vec<&TaskExecutionRunnable> {
        let mut names: Vec<&String> = self
            .predecessors
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names.iter().filter_map(|n| self.nodes.get(*n)).collect()
    }

    /// Nodes whose own state is still PENDING and whose in-graph
    /// predecessors all succeeded, given the driver's current view of
    /// task states. Tasks absent from the view keep their seeded state.
    pub fn ready_nodes(
        &self,
        current_states: &HashMap<String, TaskExecutionStatus>,
    ) -> Vec<&TaskExecutionRunnable> {
        let state_of = |name: &str| {
            current_states
                .get(name)
                .copied()
                .or_else(|| self.nodes.get(name).map(|n| n.state()))
                .unwrap_or(TaskExecutionStatus::Pending)
        };

        let mut ready: Vec<&TaskExecutionRunnable> = self
            .nodes
            .values()
            .filter(|node| state_of(node.name()) == TaskExecutionStatus::Pending)
            .filter(|node| {
                self.predecessors
                    .get(node.name())
                    .map(|preds| preds.iter().all(|p| state_of(p).is_success()))
                    .unwrap_or(true)
            })
            .collect();
        ready.sort_by(|a, b| a.name().cmp(b.name()));
        ready
    }

    /// Terminal verdict for the whole graph, or `None` while any node
    /// is still pending or running.
    pub fn verdict(
        &self,
        current_states: &HashMap<String, TaskExecutionStatus>,
    ) -> Option<WorkflowExecutionStatus> {
        if self.nodes.is_empty() {
            return Some(WorkflowExecutionStatus::Success);
        }

        let mut any_failed = false;
        for node in self.nodes.values() {
            let state = current_states
                .get(node.name())
                .copied()
                .unwrap_or_else(|| node.state());
            if !state.is_finished() {
                return None;
            }
            if !state.is_success() {
                any_failed = true;
            }
        }

        if any_failed {
            Some(WorkflowExecutionStatus::Failure)
        } else {
            Some(WorkflowExecutionStatus::Success)
        }
    }
}
