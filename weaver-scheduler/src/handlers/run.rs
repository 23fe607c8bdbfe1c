use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use weaver_common::command::CommandType;
use weaver_common::error::Error;
use weaver_common::store::WorkflowStore;
use weaver_common::workflow::{WorkflowExecutionStatus, WorkflowInstance};

use crate::config::SchedulerConfig;
use crate::graph::{ExecutionGraphBuilder, TaskExecutionRunnable, TopologyVisitor};

use super::{AssemblyContext, CommandHandler, merge_global_params};

/// Fresh start of a workflow definition. Also serves scheduler-fired
/// commands, which differ only in carrying a schedule time.
pub struct RunWorkflowHandler {
    store: Arc<dyn WorkflowStore>,
    config: SchedulerConfig,
}

impl RunWorkflowHandler {
    pub fn new(store: Arc<dyn WorkflowStore>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CommandHandler for RunWorkflowHandler {
    fn command_type(&self) -> CommandType {
        CommandType::Start
    }

    fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    async fn assemble_instance(&self, ctx: AssemblyContext) -> Result<AssemblyContext, Error> {
        let command = ctx.command();
        let definition = ctx.definition();

        let instance = WorkflowInstance {
            id: 0, // assigned by the store
            workflow_definition_code: definition.code,
            workflow_definition_version: definition.version,
            name: format!("{}-{}", definition.name, Utc::now().timestamp_millis()),
            state: WorkflowExecutionStatus::Running,
            command_type: command.command_type,
            priority: command.priority,
            host: Some(self.config.master_host.clone()),
            run_times: 1,
            start_time: Some(Utc::now()),
            restart_time: None,
            end_time: None,
            schedule_time: command.schedule_time,
            global_params: merge_global_params(definition, ctx.params()),
            variable_pool: serde_json::Value::Null,
            task_depend_type: command.task_depend_type,
            test_flag: command.test_flag,
        };

        let instance = self.store.upsert_workflow_instance(instance).await?;
        info!(
            "Handler [{}]: created instance {} for definition {} v{}",
            self.command_type(),
            instance.id,
            instance.workflow_definition_code,
            instance.workflow_definition_version
        );
        Ok(ctx.with_instance(instance))
    }

    /// A fresh run has no pre-existing task instances: every node in
    /// scope becomes a bare runnable.
    async fn assemble_execution_graph(
        &self,
        ctx: AssemblyContext,
    ) -> Result<AssemblyContext, Error> {
        let instance_id = ctx.instance()?.id;
        let depend_type = ctx.instance()?.task_depend_type;

        let mut builder = ExecutionGraphBuilder::new();
        TopologyVisitor::new(ctx.graph()).visit(
            &ctx.params().start_nodes,
            depend_type,
            |task_def, successors| {
                builder.add_node(
                    TaskExecutionRunnable {
                        workflow_instance_id: instance_id,
                        task_definition: task_def.clone(),
                        task_instance: None,
                    },
                    successors,
                )
            },
        )?;

        Ok(ctx.with_execution_graph(builder.build()))
    }
}
