use std::collections::{BTreeSet, HashMap, VecDeque};

use weaver_common::error::Error;
use weaver_common::workflow::{TaskDefinition, TaskDependType};

use super::workflow_graph::WorkflowGraph;

/// Forward topological walk over the reachable subgraph of a
/// `WorkflowGraph`. The visitor holds no state between calls; callers
/// build whatever structure they need inside the per-node callback,
/// which is why command assembly, invalidation marking, and graph
/// seeding all reuse it.
pub struct TopologyVisitor<'a> {
    graph: &'a WorkflowGraph,
}

impl<'a> TopologyVisitor<'a> {
    pub fn new(graph: &'a WorkflowGraph) -> Self {
        Self { graph }
    }

    /// Visits every node reachable from `start_nodes` exactly once, in
    /// a topological order restricted to the reachable subgraph: the
    /// callback fires only after all of the node's in-scope
    /// predecessors have fired. An empty start set means all roots.
    ///
    /// `TaskDependType::TaskPost` restricts the walk to the start set
    /// and its forward closure; `TaskDependType::TaskAll` covers the
    /// whole graph. A start node missing from the graph is fatal: the
    /// command referenced a task that is not part of this definition
    /// version.
    ///
    /// The callback receives the task definition and the set of its
    /// successors inside the visited scope.
    pub fn visit<F>(
        &self,
        start_nodes: &[String],
        depend_type: TaskDependType,
        mut visit_fn: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&TaskDefinition, &BTreeSet<String>) -> Result<(), Error>,
    {
        for name in start_nodes {
            if !self.graph.contains(name) {
                return Err(Error::StartNodeNotInGraph(name.clone()));
            }
        }

        let scope = self.resolve_scope(start_nodes, depend_type)?;

        // In-degree over the scoped subgraph only: predecessors outside
        // the scope are not required to have run.
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for name in &scope {
            let preds = self.graph.predecessors(name)?;
            let scoped = preds.iter().filter(|p| scope.contains(p.as_str())).count();
            in_degree.insert(name.as_str(), scoped);
        }

        // BTreeSet iteration keeps the ready frontier deterministic.
        let mut frontier: VecDeque<String> = scope
            .iter()
            .filter(|n| in_degree[n.as_str()] == 0)
            .cloned()
            .collect();

        let mut visited = 0usize;
        while let Some(name) = frontier.pop_front() {
            let task_def = self
                .graph
                .task_by_name(&name)
                .ok_or_else(|| Error::Internal(format!("graph lost node '{name}' mid-walk")))?;

            let scoped_successors: BTreeSet<String> = self
                .graph
                .successors(&name)?
                .into_iter()
                .filter(|s| scope.contains(s))
                .collect();

            visit_fn(task_def, &scoped_successors)?;
            visited += 1;

            for successor in &scoped_successors {
                let degree = in_degree
                    .get_mut(successor.as_str())
                    .ok_or_else(|| Error::Internal(format!("no in-degree for '{successor}'")))?;
                *degree -= 1;
                if *degree == 0 {
                    frontier.push_back(successor.clone());
                }
            }
        }

        if visited != scope.len() {
            // Unreachable for an acyclic graph; kept as a guard on the
            // invariant rather than silent truncation.
            return Err(Error::Internal(format!(
                "topology walk visited {} of {} scoped nodes in workflow {}",
                visited,
                scope.len(),
                self.graph.definition_code()
            )));
        }

        Ok(())
    }

    fn resolve_scope(
        &self,
        start_nodes: &[String],
        depend_type: TaskDependType,
    ) -> Result<BTreeSet<String>, Error> {
        if depend_type == TaskDependType::TaskAll {
            return Ok(self.graph.task_names().into_iter().collect());
        }

        let seeds: Vec<String> = if start_nodes.is_empty() {
            self.graph.root_names().iter().cloned().collect()
        } else {
            start_nodes.to_vec()
        };

        let mut scope: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = seeds.into();
        while let Some(name) = queue.pop_front() {
            if !scope.insert(name.clone()) {
                continue;
            }
            for successor in self.graph.successors(&name)? {
                if !scope.contains(&successor) {
                    queue.push_back(successor);
                }
            }
        }
        Ok(scope)
    }
}
