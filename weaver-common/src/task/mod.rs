mod instance;
mod priority;

pub use instance::{TaskExecutionStatus, TaskInstance};
pub use priority::{TaskIdentity, TaskPriority};
