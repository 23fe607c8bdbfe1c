mod definition;
mod instance;

pub use definition::{
    ExecutionPriority, RetryPolicy, TaskDefinition, TaskRelation, TimeoutPolicy,
    WorkflowDefinition,
};
pub use instance::{TaskDependType, WorkflowExecutionStatus, WorkflowInstance};
