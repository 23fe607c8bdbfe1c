use async_trait::async_trait;

use crate::dependent::DateInterval;
use crate::error::Error;
use crate::task::TaskInstance;
use crate::workflow::{WorkflowDefinition, WorkflowExecutionStatus, WorkflowInstance};

pub mod memory;

/// Read access to versioned workflow definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get_workflow_definition(
        &self,
        code: i64,
        version: i32,
    ) -> Result<Option<WorkflowDefinition>, Error>;
}

/// Read/write access to workflow instance rows.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_workflow_instance(&self, id: i32) -> Result<Option<WorkflowInstance>, Error>;

    /// Inserts (id == 0) or updates the row; returns the stored value
    /// with its assigned id.
    async fn upsert_workflow_instance(
        &self,
        instance: WorkflowInstance,
    ) -> Result<WorkflowInstance, Error>;

    /// Compare-and-set state transition. Fails with `StateTransition`
    /// when the stored state no longer matches `expected`.
    async fn update_workflow_instance_state(
        &self,
        id: i32,
        expected: WorkflowExecutionStatus,
        new: WorkflowExecutionStatus,
    ) -> Result<(), Error>;
}

/// Read/write access to task instance rows.
#[async_trait]
pub trait TaskInstanceStore: Send + Sync {
    /// All non-invalidated task instances of one workflow instance,
    /// restricted to the given test flag.
    async fn query_valid_task_instances(
        &self,
        workflow_instance_id: i32,
        test_flag: bool,
    ) -> Result<Vec<TaskInstance>, Error>;

    async fn mark_invalid(&self, task_instance_ids: &[i32]) -> Result<(), Error>;

    /// Clones `origin` into a fresh valid instance ready for
    /// re-dispatch after a failure/kill.
    async fn create_failed_recover_instance(
        &self,
        origin: &TaskInstance,
    ) -> Result<TaskInstance, Error>;

    /// Clones `origin` into a fresh valid instance ready for
    /// re-dispatch after a pause/stop.
    async fn create_pause_recover_instance(
        &self,
        origin: &TaskInstance,
    ) -> Result<TaskInstance, Error>;
}

/// Historical-run lookups backing the dependency resolver. Read-only.
#[async_trait]
pub trait RunHistoryStore: Send + Sync {
    /// Most recent run triggered by the scheduler whose schedule time
    /// falls inside the interval.
    async fn last_scheduled_run_in_interval(
        &self,
        definition_code: i64,
        interval: DateInterval,
        test_flag: bool,
    ) -> Result<Option<WorkflowInstance>, Error>;

    /// Most recent manually-triggered run whose start time falls inside
    /// the interval.
    async fn last_manual_run_in_interval(
        &self,
        definition_code: i64,
        interval: DateInterval,
        test_flag: bool,
    ) -> Result<Option<WorkflowInstance>, Error>;

    /// Earliest run by schedule time, if any scheduled run exists.
    async fn first_scheduled_run(
        &self,
        definition_code: i64,
    ) -> Result<Option<WorkflowInstance>, Error>;

    /// Earliest run by start time, if any manual run exists.
    async fn first_manual_run(
        &self,
        definition_code: i64,
    ) -> Result<Option<WorkflowInstance>, Error>;

    /// The valid instance of one task within a historical run.
    async fn task_instance_in_run(
        &self,
        workflow_instance_id: i32,
        task_code: i64,
        test_flag: bool,
    ) -> Result<Option<TaskInstance>, Error>;
}

/// The full collaborator surface the scheduling core needs from
/// persistence. Blanket-implemented for anything providing all four
/// contracts.
pub trait WorkflowStore:
    DefinitionStore + InstanceStore + TaskInstanceStore + RunHistoryStore
{
}

impl<T> WorkflowStore for T where
    T: DefinitionStore + InstanceStore + TaskInstanceStore + RunHistoryStore
{
}
