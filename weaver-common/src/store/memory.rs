//! In-memory store used by unit and scenario tests. Behaves like the
//! relational stores the service wires in production: ids are assigned
//! monotonically and "scheduled" runs are those carrying a schedule
//! time.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::dependent::DateInterval;
use crate::error::Error;
use crate::task::{TaskExecutionStatus, TaskInstance};
use crate::workflow::{WorkflowDefinition, WorkflowExecutionStatus, WorkflowInstance};

use super::{DefinitionStore, InstanceStore, RunHistoryStore, TaskInstanceStore};

#[derive(Default)]
struct Inner {
    definitions: HashMap<(i64, i32), WorkflowDefinition>,
    instances: BTreeMap<i32, WorkflowInstance>,
    task_instances: BTreeMap<i32, TaskInstance>,
    next_instance_id: i32,
    next_task_instance_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_definition(&self, definition: WorkflowDefinition) {
        let mut inner = self.inner.lock().await;
        inner
            .definitions
            .insert((definition.code, definition.version), definition);
    }

    /// Inserts an instance row, assigning the next id when id == 0.
    pub async fn insert_instance(&self, mut instance: WorkflowInstance) -> WorkflowInstance {
        let mut inner = self.inner.lock().await;
        if instance.id == 0 {
            inner.next_instance_id += 1;
            instance.id = inner.next_instance_id;
        } else {
            inner.next_instance_id = inner.next_instance_id.max(instance.id);
        }
        inner.instances.insert(instance.id, instance.clone());
        instance
    }

    /// Inserts a task-instance row, assigning the next id when id == 0.
    pub async fn insert_task_instance(&self, mut task: TaskInstance) -> TaskInstance {
        let mut inner = self.inner.lock().await;
        if task.id == 0 {
            inner.next_task_instance_id += 1;
            task.id = inner.next_task_instance_id;
        } else {
            inner.next_task_instance_id = inner.next_task_instance_id.max(task.id);
        }
        inner.task_instances.insert(task.id, task.clone());
        task
    }

    pub async fn all_task_instances(&self, workflow_instance_id: i32) -> Vec<TaskInstance> {
        let inner = self.inner.lock().await;
        inner
            .task_instances
            .values()
            .filter(|t| t.workflow_instance_id == workflow_instance_id)
            .cloned()
            .collect()
    }

    async fn create_recover_instance(
        &self,
        origin: &TaskInstance,
    ) -> Result<TaskInstance, Error> {
        let mut inner = self.inner.lock().await;
        inner.next_task_instance_id += 1;
        let mut recovered = origin.clone();
        recovered.id = inner.next_task_instance_id;
        recovered.state = TaskExecutionStatus::Pending;
        recovered.valid = true;
        recovered.host = None;
        recovered.submit_time = Some(Utc::now());
        recovered.start_time = None;
        recovered.end_time = None;
        inner.task_instances.insert(recovered.id, recovered.clone());
        Ok(recovered)
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn get_workflow_definition(
        &self,
        code: i64,
        version: i32,
    ) -> Result<Option<WorkflowDefinition>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.definitions.get(&(code, version)).cloned())
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn get_workflow_instance(&self, id: i32) -> Result<Option<WorkflowInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.instances.get(&id).cloned())
    }

    async fn upsert_workflow_instance(
        &self,
        mut instance: WorkflowInstance,
    ) -> Result<WorkflowInstance, Error> {
        let mut inner = self.inner.lock().await;
        if instance.id == 0 {
            inner.next_instance_id += 1;
            instance.id = inner.next_instance_id;
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn update_workflow_instance_state(
        &self,
        id: i32,
        expected: WorkflowExecutionStatus,
        new: WorkflowExecutionStatus,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let instance = inner
            .instances
            .get_mut(&id)
            .ok_or(Error::InstanceNotFound(id))?;
        if instance.state != expected {
            return Err(Error::StateTransition(format!(
                "instance {} is {} (expected {})",
                id, instance.state, expected
            )));
        }
        instance.state = new;
        Ok(())
    }
}

#[async_trait]
impl TaskInstanceStore for MemoryStore {
    async fn query_valid_task_instances(
        &self,
        workflow_instance_id: i32,
        test_flag: bool,
    ) -> Result<Vec<TaskInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .task_instances
            .values()
            .filter(|t| {
                t.workflow_instance_id == workflow_instance_id
                    && t.valid
                    && t.test_flag == test_flag
            })
            .cloned()
            .collect())
    }

    async fn mark_invalid(&self, task_instance_ids: &[i32]) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        for id in task_instance_ids {
            if let Some(task) = inner.task_instances.get_mut(id) {
                task.valid = false;
            }
        }
        Ok(())
    }

    async fn create_failed_recover_instance(
        &self,
        origin: &TaskInstance,
    ) -> Result<TaskInstance, Error> {
        self.create_recover_instance(origin).await
    }

    async fn create_pause_recover_instance(
        &self,
        origin: &TaskInstance,
    ) -> Result<TaskInstance, Error> {
        self.create_recover_instance(origin).await
    }
}

#[async_trait]
impl RunHistoryStore for MemoryStore {
    async fn last_scheduled_run_in_interval(
        &self,
        definition_code: i64,
        interval: DateInterval,
        test_flag: bool,
    ) -> Result<Option<WorkflowInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .values()
            .filter(|i| {
                i.workflow_definition_code == definition_code
                    && i.test_flag == test_flag
                    && i.schedule_time.is_some_and(|t| interval.contains(t))
            })
            .max_by_key(|i| i.id)
            .cloned())
    }

    async fn last_manual_run_in_interval(
        &self,
        definition_code: i64,
        interval: DateInterval,
        test_flag: bool,
    ) -> Result<Option<WorkflowInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .values()
            .filter(|i| {
                i.workflow_definition_code == definition_code
                    && i.test_flag == test_flag
                    && i.schedule_time.is_none()
                    && i.start_time.is_some_and(|t| interval.contains(t))
            })
            .max_by_key(|i| i.id)
            .cloned())
    }

    async fn first_scheduled_run(
        &self,
        definition_code: i64,
    ) -> Result<Option<WorkflowInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .values()
            .filter(|i| i.workflow_definition_code == definition_code && i.schedule_time.is_some())
            .min_by_key(|i| (i.schedule_time, i.id))
            .cloned())
    }

    async fn first_manual_run(
        &self,
        definition_code: i64,
    ) -> Result<Option<WorkflowInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .values()
            .filter(|i| {
                i.workflow_definition_code == definition_code
                    && i.schedule_time.is_none()
                    && i.start_time.is_some()
            })
            .min_by_key(|i| (i.start_time, i.id))
            .cloned())
    }

    async fn task_instance_in_run(
        &self,
        workflow_instance_id: i32,
        task_code: i64,
        test_flag: bool,
    ) -> Result<Option<TaskInstance>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .task_instances
            .values()
            .find(|t| {
                t.workflow_instance_id == workflow_instance_id
                    && t.task_code == task_code
                    && t.valid
                    && t.test_flag == test_flag
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, TimeZone};

    use crate::command::CommandType;
    use crate::workflow::{ExecutionPriority, TaskDependType};

    use super::*;

    fn manual_run(id: i32, start_time: Option<DateTime<Utc>>) -> WorkflowInstance {
        WorkflowInstance {
            id,
            workflow_definition_code: 200,
            workflow_definition_version: 1,
            name: format!("run-{id}"),
            state: WorkflowExecutionStatus::Running,
            command_type: CommandType::Start,
            priority: ExecutionPriority::Medium,
            host: None,
            run_times: 1,
            start_time,
            restart_time: None,
            end_time: None,
            schedule_time: None,
            global_params: BTreeMap::new(),
            variable_pool: serde_json::Value::Null,
            task_depend_type: TaskDependType::TaskPost,
            test_flag: false,
        }
    }

    #[tokio::test]
    async fn first_manual_run_skips_instances_that_never_started() {
        let store = MemoryStore::new();
        // Newer row, no start time yet: must not count as the earliest.
        store.insert_instance(manual_run(2, None)).await;
        store
            .insert_instance(manual_run(
                1,
                Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()),
            ))
            .await;

        let first = store.first_manual_run(200).await.unwrap().unwrap();
        assert_eq!(first.id, 1);

        assert!(store.first_manual_run(999).await.unwrap().is_none());
    }
}
