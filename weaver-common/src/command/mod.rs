use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::Error;
use crate::workflow::{ExecutionPriority, TaskDependType, WorkflowExecutionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum CommandType {
    /// Fresh start of a workflow definition.
    Start,
    /// Scheduler-fired start; handled exactly like `Start`.
    Scheduler,
    /// Full rerun of a finished instance from scratch.
    RepeatRunning,
    /// Partial rerun from the failed/paused tasks onward.
    StartFailureTaskProcess,
    /// Fault-tolerance takeover after the owning master died.
    RecoverToleranceFaultProcess,
}

/// Typed view of a command's JSON parameter payload. Unknown fields are
/// tolerated; a payload that fails to parse is fatal for the command.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandParams {
    /// Explicit start-task names; empty means "all graph roots".
    pub start_nodes: Vec<String>,
    /// Command-supplied global parameters, merged over the definition's
    /// globals (these win on key collision).
    pub global_params: BTreeMap<String, String>,
    /// For failover commands: the instance state recorded by the
    /// process that detected the dead master.
    pub recovered_state: Option<WorkflowExecutionStatus>,
}

/// A persisted instruction to start/rerun/recover/fail-over a workflow
/// instance. Rows are produced by the API layer and consumed here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    pub id: i32,
    pub command_type: CommandType,
    pub workflow_definition_code: i64,
    pub workflow_definition_version: i32,
    /// Present for every type except fresh starts.
    pub workflow_instance_id: Option<i32>,
    pub priority: ExecutionPriority,
    pub task_depend_type: TaskDependType,
    pub schedule_time: Option<DateTime<Utc>>,
    pub test_flag: bool,
    /// Raw JSON payload; see `CommandParams`.
    pub params: serde_json::Value,
}

impl Command {
    pub fn parse_params(&self) -> Result<CommandParams, Error> {
        if self.params.is_null() {
            return Ok(CommandParams::default());
        }
        serde_json::from_value(self.params.clone())
            .map_err(|e| Error::InvalidCommandParams(format!("command {}: {}", self.id, e)))
    }
}
