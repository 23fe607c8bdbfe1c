use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Numeric priority attached to workflow instances and task instances.
/// Lower code wins: `Highest` drains before `High`, and so on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ExecutionPriority {
    Highest = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
    Lowest = 4,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: i32,
    /// Minutes between attempts.
    pub retry_interval: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_interval: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub enabled: bool,
    /// Minutes before the timeout strategy fires.
    pub duration: i32,
}

/// One node of a workflow definition. Static, versioned with the
/// workflow that owns it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub code: i64,
    pub version: i32,
    pub name: String,
    /// Plugin tag (SHELL, SQL, DEPENDENT, ...). Opaque to the core.
    pub task_type: String,
    pub priority: ExecutionPriority,
    pub retry_policy: RetryPolicy,
    pub timeout_policy: TimeoutPolicy,
    /// Worker-group affinity used at dispatch time.
    pub worker_group: String,
    /// Optional task-group id for group-scoped concurrency limiting.
    pub task_group_id: Option<i32>,
    pub task_group_priority: i32,
    /// Plugin-specific parameter document. Opaque to the core.
    pub task_params: serde_json::Value,
}

/// Directed edge of the static DAG, predecessor -> successor, by task
/// definition code.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRelation {
    pub pre_task_code: i64,
    pub post_task_code: i64,
}

/// Immutable (code, version) workflow definition: ordered task nodes
/// plus directed edges. Loaded once per command handling, never
/// mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub code: i64,
    pub version: i32,
    pub name: String,
    pub project_code: i64,
    pub priority: ExecutionPriority,
    /// Definition-level global parameters; command-supplied params are
    /// merged over these (command wins on key collision).
    pub global_params: BTreeMap<String, String>,
    pub tasks: Vec<TaskDefinition>,
    pub relations: Vec<TaskRelation>,
}

impl WorkflowDefinition {
    pub fn task_by_code(&self, code: i64) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.code == code)
    }

    pub fn task_by_name(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
