use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use weaver_common::command::CommandType;
use weaver_common::error::Error;
use weaver_common::store::WorkflowStore;
use weaver_common::task::TaskInstance;

use crate::config::SchedulerConfig;
use crate::graph::{ExecutionGraphBuilder, TaskExecutionRunnable, TopologyVisitor};

use super::{AssemblyContext, CommandHandler, load_commanded_instance};

/// Fault-tolerance takeover: the owning master died, and this master
/// picks the instance back up exactly where its task-instance rows
/// left off. No invalidation, no new rows; the instance state comes
/// from the failover payload recorded by the detecting process.
pub struct FailoverWorkflowHandler {
    store: Arc<dyn WorkflowStore>,
    config: SchedulerConfig,
}

impl FailoverWorkflowHandler {
    pub fn new(store: Arc<dyn WorkflowStore>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CommandHandler for FailoverWorkflowHandler {
    fn command_type(&self) -> CommandType {
        CommandType::RecoverToleranceFaultProcess
    }

    fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    async fn assemble_instance(&self, ctx: AssemblyContext) -> Result<AssemblyContext, Error> {
        let mut instance = load_commanded_instance(&self.store, ctx.command()).await?;

        let recovered_state = ctx.params().recovered_state.ok_or_else(|| {
            Error::InvalidCommandParams(format!(
                "failover command {} carries no recovered instance state",
                ctx.command().id
            ))
        })?;

        let previous_host = instance.host.take();
        instance.state = recovered_state;
        instance.command_type = ctx.command().command_type;
        instance.run_times += 1;
        instance.restart_time = Some(Utc::now());
        instance.host = Some(self.config.master_host.clone());

        info!(
            "Handler [{}]: taking over instance {} from {:?} in state {}",
            self.command_type(),
            instance.id,
            previous_host,
            instance.state
        );

        let instance = self.store.upsert_workflow_instance(instance).await?;
        Ok(ctx.with_instance(instance))
    }

    /// Rebuilds the graph directly from the currently-valid task
    /// instances: finished-successful tasks stay out, everything else
    /// becomes a node resuming its existing instance.
    async fn assemble_execution_graph(
        &self,
        ctx: AssemblyContext,
    ) -> Result<AssemblyContext, Error> {
        let instance = ctx.instance()?;
        let instance_id = instance.id;

        let mut by_code: HashMap<i64, TaskInstance> = self
            .store
            .query_valid_task_instances(instance_id, instance.test_flag)
            .await?
            .into_iter()
            .map(|t| (t.task_code, t))
            .collect();

        let mut builder = ExecutionGraphBuilder::new();
        TopologyVisitor::new(ctx.graph()).visit(
            &ctx.params().start_nodes,
            instance.task_depend_type,
            |task_def, successors| {
                let existing = by_code.remove(&task_def.code);
                if existing.as_ref().is_some_and(|t| t.state.is_success()) {
                    return Ok(());
                }
                builder.add_node(
                    TaskExecutionRunnable {
                        workflow_instance_id: instance_id,
                        task_definition: task_def.clone(),
                        task_instance: existing,
                    },
                    successors,
                )
            },
        )?;

        Ok(ctx.with_execution_graph(builder.build()))
    }
}
