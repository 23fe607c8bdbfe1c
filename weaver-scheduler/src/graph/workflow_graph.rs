use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::{
    Direction::{Incoming, Outgoing},
    algo::is_cyclic_directed,
    graph::{DiGraph, NodeIndex},
};
use tracing::warn;
use weaver_common::error::Error;
use weaver_common::workflow::{TaskDefinition, WorkflowDefinition};

/// Static DAG of one workflow definition version. Nodes are task
/// definitions, an edge from A to B means A must complete before B can
/// start. Built once per command handling and never mutated.
#[derive(Debug)]
pub struct WorkflowGraph {
    definition_code: i64,
    graph: DiGraph<TaskDefinition, ()>,
    code_to_node_idx: HashMap<i64, NodeIndex>,
    name_to_node_idx: HashMap<String, NodeIndex>,
    /// Names of nodes with no incoming edges.
    root_names: BTreeSet<String>,
    /// Names of nodes with no outgoing edges.
    leaf_names: BTreeSet<String>,
}

impl WorkflowGraph {
    pub fn new(definition: &WorkflowDefinition) -> Result<Self, Error> {
        let mut graph = DiGraph::new();
        let mut code_to_node_idx = HashMap::new();
        let mut name_to_node_idx = HashMap::new();

        if definition.tasks.is_empty() {
            warn!(
                "Graph [{}]: building a graph for an empty workflow definition.",
                definition.code
            );
        }

        for task_def in &definition.tasks {
            if code_to_node_idx.contains_key(&task_def.code) {
                return Err(Error::Conflict(format!(
                    "duplicate task code {} in workflow definition {}",
                    task_def.code, definition.code
                )));
            }
            if name_to_node_idx.contains_key(&task_def.name) {
                return Err(Error::Conflict(format!(
                    "duplicate task name '{}' in workflow definition {}",
                    task_def.name, definition.code
                )));
            }

            let node_idx = graph.add_node(task_def.clone());
            code_to_node_idx.insert(task_def.code, node_idx);
            name_to_node_idx.insert(task_def.name.clone(), node_idx);
        }

        for relation in &definition.relations {
            let from = code_to_node_idx.get(&relation.pre_task_code).ok_or_else(|| {
                Error::Conflict(format!(
                    "relation references unknown predecessor code {} in workflow definition {}",
                    relation.pre_task_code, definition.code
                ))
            })?;
            let to = code_to_node_idx.get(&relation.post_task_code).ok_or_else(|| {
                Error::Conflict(format!(
                    "relation references unknown successor code {} in workflow definition {}",
                    relation.post_task_code, definition.code
                ))
            })?;
            graph.add_edge(*from, *to, ());
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::CyclicGraph(definition.code));
        }

        let mut root_names = BTreeSet::new();
        let mut leaf_names = BTreeSet::new();
        for (name, node_idx) in &name_to_node_idx {
            if graph.neighbors_directed(*node_idx, Incoming).count() == 0 {
                root_names.insert(name.clone());
            }
            if graph.neighbors_directed(*node_idx, Outgoing).count() == 0 {
                leaf_names.insert(name.clone());
            }
        }

        Ok(Self {
            definition_code: definition.code,
            graph,
            code_to_node_idx,
            name_to_node_idx,
            root_names,
            leaf_names,
        })
    }

    pub fn definition_code(&self) -> i64 {
        self.definition_code
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.name_to_node_idx.contains_key(task_name)
    }

    pub fn task_by_code(&self, task_code: i64) -> Option<&TaskDefinition> {
        self.code_to_node_idx
            .get(&task_code)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    pub fn task_by_name(&self, task_name: &str) -> Option<&TaskDefinition> {
        self.name_to_node_idx
            .get(task_name)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    pub fn task_names(&self) -> Vec<String> {
        self.name_to_node_idx.keys().cloned().collect()
    }

    /// Nodes with no incoming edges, in name order.
    pub fn root_names(&self) -> &BTreeSet<String> {
        &self.root_names
    }

    pub fn leaf_names(&self) -> &BTreeSet<String> {
        &self.leaf_names
    }

    pub fn successors(&self, task_name: &str) -> Result<HashSet<String>, Error> {
        self.neighbor_names(task_name, Outgoing)
    }

    pub fn predecessors(&self, task_name: &str) -> Result<HashSet<String>, Error> {
        self.neighbor_names(task_name, Incoming)
    }

    fn neighbor_names(
        &self,
        task_name: &str,
        direction: petgraph::Direction,
    ) -> Result<HashSet<String>, Error> {
        let node_idx = self
            .name_to_node_idx
            .get(task_name)
            .ok_or_else(|| Error::StartNodeNotInGraph(task_name.to_string()))?;
        Ok(self
            .graph
            .neighbors_directed(*node_idx, direction)
            .filter_map(|idx| self.graph.node_weight(idx).map(|t| t.name.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use weaver_common::workflow::TaskRelation;

    use crate::graph::test_support::{definition, task};

    use super::*;

    #[test]
    fn diamond_graph_exposes_roots_leaves_and_neighbors() {
        // a -> b, a -> c, b -> d, c -> d
        let def = definition(
            100,
            vec![task(1, "a"), task(2, "b"), task(3, "c"), task(4, "d")],
            vec![(1, 2), (1, 3), (2, 4), (3, 4)],
        );
        let graph = WorkflowGraph::new(&def).unwrap();

        assert_eq!(graph.node_count(), 4);
        assert!(graph.root_names().contains("a"));
        assert_eq!(graph.root_names().len(), 1);
        assert!(graph.leaf_names().contains("d"));
        assert_eq!(
            graph.successors("a").unwrap(),
            HashSet::from(["b".to_string(), "c".to_string()])
        );
        assert_eq!(
            graph.predecessors("d").unwrap(),
            HashSet::from(["b".to_string(), "c".to_string()])
        );
        assert_eq!(graph.task_by_code(3).unwrap().name, "c");
        assert_eq!(graph.task_by_name("b").unwrap().code, 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let def = definition(
            100,
            vec![task(1, "a"), task(2, "b")],
            vec![(1, 2), (2, 1)],
        );
        assert!(matches!(
            WorkflowGraph::new(&def),
            Err(Error::CyclicGraph(100))
        ));
    }

    #[test]
    fn duplicate_task_code_is_a_conflict() {
        let def = definition(100, vec![task(1, "a"), task(1, "b")], vec![]);
        assert!(matches!(WorkflowGraph::new(&def), Err(Error::Conflict(_))));
    }

    #[test]
    fn relation_to_unknown_code_is_a_conflict() {
        let mut def = definition(100, vec![task(1, "a")], vec![]);
        def.relations.push(TaskRelation {
            pre_task_code: 1,
            post_task_code: 99,
        });
        assert!(matches!(WorkflowGraph::new(&def), Err(Error::Conflict(_))));
    }

    #[test]
    fn unknown_name_lookup_is_a_start_node_error() {
        let def = definition(100, vec![task(1, "a")], vec![]);
        let graph = WorkflowGraph::new(&def).unwrap();
        assert!(matches!(
            graph.successors("missing"),
            Err(Error::StartNodeNotInGraph(_))
        ));
    }
}
