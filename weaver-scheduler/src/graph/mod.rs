mod execution_graph;
mod topology;
mod workflow_graph;

pub use execution_graph::{ExecutionGraphBuilder, TaskExecutionRunnable, WorkflowExecutionGraph};
pub use topology::TopologyVisitor;
pub use workflow_graph::WorkflowGraph;
