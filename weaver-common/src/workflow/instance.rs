use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::command::CommandType;

use super::ExecutionPriority;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum WorkflowExecutionStatus {
    Submitted,
    Running,
    ReadyPause,
    Pause,
    ReadyStop,
    Stop,
    Failure,
    Success,
    Kill,
    FailoverWait,
}

impl WorkflowExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            WorkflowExecutionStatus::Success
                | WorkflowExecutionStatus::Failure
                | WorkflowExecutionStatus::Stop
                | WorkflowExecutionStatus::Kill
                | WorkflowExecutionStatus::Pause
        )
    }
}

/// Controls how far the topology walk reaches from the selected start
/// nodes: only their forward closure, or the whole graph.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskDependType {
    /// Visit the start nodes and every transitive successor.
    #[default]
    TaskPost,
    /// Visit every node of the graph regardless of the start set.
    TaskAll,
}

/// One run of a `WorkflowDefinition`. Owned exclusively by the master
/// that holds it while RUNNING.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: i32,
    pub workflow_definition_code: i64,
    pub workflow_definition_version: i32,
    pub name: String,
    pub state: WorkflowExecutionStatus,
    /// The command type that produced or last mutated this instance.
    pub command_type: CommandType,
    pub priority: ExecutionPriority,
    /// Host of the master currently owning the instance.
    pub host: Option<String>,
    pub run_times: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub restart_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub schedule_time: Option<DateTime<Utc>>,
    /// Merged global parameter set (definition globals + command
    /// overrides, command wins).
    pub global_params: BTreeMap<String, String>,
    /// Runtime variable pool, reset on full rerun.
    pub variable_pool: serde_json::Value,
    pub task_depend_type: TaskDependType,
    pub test_flag: bool,
}
