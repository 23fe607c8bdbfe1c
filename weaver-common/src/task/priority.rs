use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::ExecutionPriority;

/// Identity of a task awaiting dispatch. A persisted task-instance id
/// may not exist yet at enqueue time, so identity is the triple below.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    pub workflow_instance_id: i32,
    pub task_code: i64,
    pub task_definition_version: i32,
}

/// Ordering key for cross-workflow dispatch. Owns no resources; it is
/// compared, hashed on identity, and nothing else.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskPriority {
    pub workflow_priority: ExecutionPriority,
    pub workflow_instance_id: i32,
    pub task_priority: ExecutionPriority,
    pub task_group_priority: i32,
    pub task_id: i32,
    pub task_code: i64,
    pub task_definition_version: i32,
    /// Worker-group name the task is bound to.
    pub group_name: String,
    pub submitted_at: DateTime<Utc>,
}

impl TaskPriority {
    pub fn identity(&self) -> TaskIdentity {
        TaskIdentity {
            workflow_instance_id: self.workflow_instance_id,
            task_code: self.task_code,
            task_definition_version: self.task_definition_version,
        }
    }
}

impl PartialEq for TaskPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TaskPriority {}

impl PartialOrd for TaskPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskPriority {
    /// Precedence chain, all ascending except task-group priority:
    /// workflow priority, workflow instance id, task priority,
    /// task-group priority (descending, larger wins), task id, group
    /// name, enqueue time. Ties beyond that are true equality.
    fn cmp(&self, other: &Self) -> Ordering {
        self.workflow_priority
            .cmp(&other.workflow_priority)
            .then_with(|| self.workflow_instance_id.cmp(&other.workflow_instance_id))
            .then_with(|| self.task_priority.cmp(&other.task_priority))
            .then_with(|| other.task_group_priority.cmp(&self.task_group_priority))
            .then_with(|| self.task_id.cmp(&other.task_id))
            .then_with(|| self.group_name.cmp(&other.group_name))
            .then_with(|| self.submitted_at.cmp(&other.submitted_at))
    }
}
