use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::workflow::ExecutionPriority;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskExecutionStatus {
    Pending,
    Dispatch,
    Running,
    Pause,
    Stop,
    Failure,
    Success,
    Kill,
    NeedFaultTolerance,
}

impl TaskExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskExecutionStatus::Success
                | TaskExecutionStatus::Failure
                | TaskExecutionStatus::Stop
                | TaskExecutionStatus::Kill
                | TaskExecutionStatus::Pause
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskExecutionStatus::Success)
    }

    /// States that a failure recovery re-creates as a fresh
    /// failed-recover instance.
    pub fn needs_failure_recovery(&self) -> bool {
        matches!(
            self,
            TaskExecutionStatus::Failure
                | TaskExecutionStatus::Kill
                | TaskExecutionStatus::NeedFaultTolerance
        )
    }

    /// States that a failure recovery re-creates as a fresh
    /// pause-recover instance.
    pub fn needs_pause_recovery(&self) -> bool {
        matches!(self, TaskExecutionStatus::Pause | TaskExecutionStatus::Stop)
    }
}

/// One execution attempt of a `TaskDefinition` within a
/// `WorkflowInstance`. Several may exist historically for the same
/// definition across reruns; at most one is valid at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: i32,
    pub workflow_instance_id: i32,
    pub task_code: i64,
    pub task_definition_version: i32,
    pub name: String,
    pub task_type: String,
    pub state: TaskExecutionStatus,
    /// False once superseded by a rerun or recovery instance.
    pub valid: bool,
    pub priority: ExecutionPriority,
    pub task_group_id: Option<i32>,
    pub task_group_priority: i32,
    pub worker_group: String,
    pub host: Option<String>,
    pub retry_times: i32,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub test_flag: bool,
}
