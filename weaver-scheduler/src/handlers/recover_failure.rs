use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use weaver_common::command::CommandType;
use weaver_common::error::Error;
use weaver_common::store::WorkflowStore;
use weaver_common::task::TaskInstance;
use weaver_common::workflow::WorkflowExecutionStatus;

use crate::config::SchedulerConfig;
use crate::graph::{ExecutionGraphBuilder, TaskExecutionRunnable, TopologyVisitor};

use super::{AssemblyContext, CommandHandler, load_commanded_instance};

/// What the marking pass decided for one visited task.
enum NodeAction {
    /// Valid successful instance untouched by any invalidation: not
    /// part of the rebuilt graph at all.
    KeepOutOfGraph,
    /// No successful instance and no invalidation upstream: still has
    /// to run, resuming whatever instance already exists.
    Resume(Option<TaskInstance>),
    /// Seed: recreate as a failed-recover instance.
    RecoverFailed(TaskInstance),
    /// Seed: recreate as a pause-recover instance.
    RecoverPaused(TaskInstance),
    /// Downstream of an invalidated task: its prior result cannot be
    /// trusted, so the instance (if any) is invalidated and the node
    /// re-runs fresh.
    Invalidate(Option<TaskInstance>),
}

/// Partial rerun after failure: failed/killed tasks restart as
/// failed-recover instances, paused/stopped ones as pause-recover
/// instances, invalidation propagates to every transitive successor,
/// and untouched successful tasks keep their results and stay out of
/// the graph.
pub struct RecoverFailureTaskHandler {
    store: Arc<dyn WorkflowStore>,
    config: SchedulerConfig,
}

impl RecoverFailureTaskHandler {
    pub fn new(store: Arc<dyn WorkflowStore>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CommandHandler for RecoverFailureTaskHandler {
    fn command_type(&self) -> CommandType {
        CommandType::StartFailureTaskProcess
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

        let instance = self.store.upsert_workflow_instance(instance).await?;
        Ok(ctx.with_instance(instance))
    }

    /// Two passes. The marking pass walks the topology in dependency
    /// order and classifies every in-scope task, carrying the
    /// invalidated set forward. The recreate pass then performs the
    /// store writes and builds the graph; it is idempotent because
    /// recovered instances come back PENDING and are classified as
    /// `Resume` on a repeated command.
    async fn assemble_execution_graph(
        &self,
        ctx: AssemblyContext,
    ) -> Result<AssemblyContext, Error> {
        let instance = ctx.instance()?;
        let instance_id = instance.id;

        let valid_instances = self
            .store
            .query_valid_task_instances(instance_id, instance.test_flag)
            .await?;
        let mut by_code: HashMap<i64, TaskInstance> = valid_instances
            .into_iter()
            .map(|t| (t.task_code, t))
            .collect();

        // Pass 1: mark forward.
        let mut invalidated: HashSet<String> = HashSet::new();
        let mut actions: Vec<(TaskExecutionRunnable, BTreeSet<String>, NodeAction)> = Vec::new();
        let graph = ctx.graph();
        TopologyVisitor::new(graph).visit(
            &ctx.params().start_nodes,
            instance.task_depend_type,
            |task_def, successors| {
                let existing = by_code.remove(&task_def.code);
                let upstream_invalid = graph
                    .predecessors(&task_def.name)?
                    .iter()
                    .any(|p| invalidated.contains(p));

                let action = match existing {
                    Some(task) if task.state.needs_failure_recovery() => {
                        invalidated.insert(task_def.name.clone());
                        NodeAction::RecoverFailed(task)
                    }
                    Some(task) if task.state.needs_pause_recovery() => {
                        invalidated.insert(task_def.name.clone());
                        NodeAction::RecoverPaused(task)
                    }
                    existing if upstream_invalid => {
                        invalidated.insert(task_def.name.clone());
                        NodeAction::Invalidate(existing)
                    }
                    Some(task) if task.state.is_success() => NodeAction::KeepOutOfGraph,
                    existing => NodeAction::Resume(existing),
                };

                actions.push((
                    TaskExecutionRunnable {
                        workflow_instance_id: instance_id,
                        task_definition: task_def.clone(),
                        task_instance: None,
                    },
                    successors.clone(),
                    action,
                ));
                Ok(())
            },
        )?;

        // Pass 2: recreate and assemble.
        let mut builder = ExecutionGraphBuilder::new();
        let mut recovered = 0usize;
        for (mut runnable, successors, action) in actions {
            match action {
                NodeAction::KeepOutOfGraph => continue,
                NodeAction::Resume(existing) => {
                    runnable.task_instance = existing;
                }
                NodeAction::RecoverFailed(origin) => {
                    self.store.mark_invalid(&[origin.id]).await?;
                    runnable.task_instance =
                        Some(self.store.create_failed_recover_instance(&origin).await?);
                    recovered += 1;
                }
                NodeAction::RecoverPaused(origin) => {
                    self.store.mark_invalid(&[origin.id]).await?;
                    runnable.task_instance =
                        Some(self.store.create_pause_recover_instance(&origin).await?);
                    recovered += 1;
                }
                NodeAction::Invalidate(existing) => {
                    if let Some(origin) = existing {
                        self.store.mark_invalid(&[origin.id]).await?;
                    }
                }
            }
            builder.add_node(runnable, &successors)?;
        }

        info!(
            "Handler [{}]: instance {} recovery recreated {} task instances",
            self.command_type(),
            instance_id,
            recovered
        );
        Ok(ctx.with_execution_graph(builder.build()))
    }
}
