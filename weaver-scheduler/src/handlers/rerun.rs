use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use weaver_common::command::CommandType;
use weaver_common::error::Error;
use weaver_common::store::WorkflowStore;
use weaver_common::workflow::WorkflowExecutionStatus;

use crate::config::SchedulerConfig;
use crate::graph::{ExecutionGraphBuilder, TaskExecutionRunnable, TopologyVisitor};

use super::{AssemblyContext, CommandHandler, load_commanded_instance, merge_global_params};

/// Full rerun of a finished instance: the same row restarts from
/// scratch and every previously valid task instance is invalidated
/// before the graph is rebuilt.
pub struct RepeatRunningHandler {
    store: Arc<dyn WorkflowStore>,
    config: SchedulerConfig,
}

impl RepeatRunningHandler {
    pub fn new(store: Arc<dyn WorkflowStore>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CommandHandler for RepeatRunningHandler {
    fn command_type(&self) -> CommandType {
        CommandType::RepeatRunning
    }

    fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    async fn assemble_instance(&self, ctx: AssemblyContext) -> Result<AssemblyContext, Error> {
        let mut instance = load_commanded_instance(&self.store, ctx.command()).await?;

        instance.state = WorkflowExecutionStatus::Running;
        instance.command_type = ctx.command().command_type;
        instance.run_times += 1;
        instance.restart_time = Some(Utc::now());
        instance.end_time = None;
        instance.host = Some(self.config.master_host.clone());
        instance.variable_pool = serde_json::Value::Null;
        instance.global_params = merge_global_params(ctx.definition(), ctx.params());

        // The whole DAG re-executes: nothing from prior runs stays
        // valid.
        let prior = self
            .store
            .query_valid_task_instances(instance.id, instance.test_flag)
            .await?;
        if !prior.is_empty() {
            let ids: Vec<i32> = prior.iter().map(|t| t.id).collect();
            self.store.mark_invalid(&ids).await?;
            info!(
                "Handler [{}]: invalidated {} prior task instances of instance {}",
                self.command_type(),
                ids.len(),
                instance.id
            );
        }

        let instance = self.store.upsert_workflow_instance(instance).await?;
        Ok(ctx.with_instance(instance))
    }

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
