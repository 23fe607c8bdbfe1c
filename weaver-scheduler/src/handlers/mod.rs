use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;
use weaver_common::command::{Command, CommandParams, CommandType};
use weaver_common::error::Error;
use weaver_common::event::{LoggingLifecycleListener, WorkflowEventBus, WorkflowLifecycleListener};
use weaver_common::store::WorkflowStore;
use weaver_common::workflow::{WorkflowDefinition, WorkflowInstance};

use crate::config::SchedulerConfig;
use crate::graph::{WorkflowExecutionGraph, WorkflowGraph};

mod failover;
mod recover_failure;
mod rerun;
mod run;

pub use failover::FailoverWorkflowHandler;
pub use recover_failure::RecoverFailureTaskHandler;
pub use rerun::RepeatRunningHandler;
pub use run::RunWorkflowHandler;

/// A command turned into everything the per-instance runnable needs:
/// the instance row, both graphs, listeners, and a fresh (empty) event
/// bus. Sealed once; nothing here mutates after assembly.
pub struct ExecutableWorkflowUnit {
    pub id: Uuid,
    pub workflow_instance: WorkflowInstance,
    pub workflow_graph: WorkflowGraph,
    pub execution_graph: WorkflowExecutionGraph,
    pub event_bus: WorkflowEventBus,
    pub listeners: Vec<Arc<dyn WorkflowLifecycleListener>>,
}

impl std::fmt::Debug for ExecutableWorkflowUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableWorkflowUnit")
            .field("id", &self.id)
            .field("workflow_instance", &self.workflow_instance)
            .field("workflow_graph", &self.workflow_graph)
            .field("execution_graph", &self.execution_graph)
            .field("event_bus", &self.event_bus)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// In-progress assembly state threaded through the template steps.
/// Each step consumes the context and returns an updated one; the
/// final `seal` is the only place an `ExecutableWorkflowUnit` is born,
/// so a half-assembled unit can never escape.
pub struct AssemblyContext {
    command: Command,
    params: CommandParams,
    definition: WorkflowDefinition,
    graph: WorkflowGraph,
    instance: Option<WorkflowInstance>,
    execution_graph: Option<WorkflowExecutionGraph>,
}

impl AssemblyContext {
    fn new(
        command: Command,
        params: CommandParams,
        definition: WorkflowDefinition,
        graph: WorkflowGraph,
    ) -> Self {
        Self {
            command,
            params,
            definition,
            graph,
            instance: None,
            execution_graph: None,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn params(&self) -> &CommandParams {
        &self.params
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// The assembled instance; calling this before `assemble_instance`
    /// ran is a template-ordering bug.
    pub fn instance(&self) -> Result<&WorkflowInstance, Error> {
        self.instance
            .as_ref()
            .ok_or_else(|| Error::Internal("workflow instance not assembled yet".to_string()))
    }

    pub fn with_instance(mut self, instance: WorkflowInstance) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_execution_graph(mut self, execution_graph: WorkflowExecutionGraph) -> Self {
        self.execution_graph = Some(execution_graph);
        self
    }

    fn seal(
        self,
        listeners: Vec<Arc<dyn WorkflowLifecycleListener>>,
    ) -> Result<ExecutableWorkflowUnit, Error> {
        let instance = self
            .instance
            .ok_or_else(|| Error::Internal("sealed without a workflow instance".to_string()))?;
        let execution_graph = self
            .execution_graph
            .ok_or_else(|| Error::Internal("sealed without an execution graph".to_string()))?;

        let unit = ExecutableWorkflowUnit {
            id: Uuid::new_v4(),
            workflow_instance: instance,
            workflow_graph: self.graph,
            execution_graph,
            event_bus: WorkflowEventBus::new(),
            listeners,
        };
        for listener in &unit.listeners {
            listener.on_assembled(&unit.workflow_instance);
        }
        Ok(unit)
    }
}

/// One implementation per command kind, all sharing the `handle`
/// template: load definition, build the static graph, assemble the
/// instance, assemble the runtime graph, seal. Variants only fill in
/// the two capability methods.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn command_type(&self) -> CommandType;

    fn store(&self) -> &Arc<dyn WorkflowStore>;

    async fn assemble_instance(&self, ctx: AssemblyContext) -> Result<AssemblyContext, Error>;

    async fn assemble_execution_graph(
        &self,
        ctx: AssemblyContext,
    ) -> Result<AssemblyContext, Error>;

    async fn handle(&self, command: Command) -> Result<ExecutableWorkflowUnit, Error> {
        let params = command.parse_params()?;

        let definition = self
            .store()
            .get_workflow_definition(
                command.workflow_definition_code,
                command.workflow_definition_version,
            )
            .await?
            .ok_or(Error::DefinitionNotFound {
                code: command.workflow_definition_code,
                version: command.workflow_definition_version,
            })?;

        let graph = WorkflowGraph::new(&definition)?;

        let ctx = AssemblyContext::new(command, params, definition, graph);
        let ctx = self.assemble_instance(ctx).await?;
        let ctx = self.assemble_execution_graph(ctx).await?;

        let unit = ctx.seal(vec![Arc::new(LoggingLifecycleListener)])?;
        info!(
            "Handler [{}]: assembled unit {} for instance {} ({} execution nodes)",
            self.command_type(),
            unit.id,
            unit.workflow_instance.id,
            unit.execution_graph.len()
        );
        Ok(unit)
    }
}

/// Dispatches persisted commands to their handler. Constructed with
/// explicit dependencies; no process-wide registry.
pub struct CommandHandlerRegistry {
    handlers: HashMap<CommandType, Arc<dyn CommandHandler>>,
}

impl CommandHandlerRegistry {
    pub fn new(store: Arc<dyn WorkflowStore>, config: SchedulerConfig) -> Self {
        let run = Arc::new(RunWorkflowHandler::new(Arc::clone(&store), config.clone()));
        let mut handlers: HashMap<CommandType, Arc<dyn CommandHandler>> = HashMap::new();
        handlers.insert(CommandType::Start, Arc::clone(&run) as Arc<dyn CommandHandler>);
        // Scheduler-fired commands run exactly like manual starts.
        handlers.insert(CommandType::Scheduler, run);
        handlers.insert(
            CommandType::RepeatRunning,
            Arc::new(RepeatRunningHandler::new(Arc::clone(&store), config.clone())),
        );
        handlers.insert(
            CommandType::StartFailureTaskProcess,
            Arc::new(RecoverFailureTaskHandler::new(Arc::clone(&store), config.clone())),
        );
        handlers.insert(
            CommandType::RecoverToleranceFaultProcess,
            Arc::new(FailoverWorkflowHandler::new(store, config)),
        );
        Self { handlers }
    }

    pub async fn handle(&self, command: Command) -> Result<ExecutableWorkflowUnit, Error> {
        let handler = self.handlers.get(&command.command_type).ok_or_else(|| {
            Error::Internal(format!(
                "no handler registered for command type {}",
                command.command_type
            ))
        })?;
        handler.handle(command).await
    }
}

/// Definition globals with command-supplied overrides merged on top;
/// the command wins on key collision.
pub(crate) fn merge_global_params(
    definition: &WorkflowDefinition,
    params: &CommandParams,
) -> BTreeMap<String, String> {
    let mut merged = definition.global_params.clone();
    for (key, value) in &params.global_params {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Loads the instance row the command points at; both a missing id and
/// a missing row are fatal for the command.
pub(crate) async fn load_commanded_instance(
    store: &Arc<dyn WorkflowStore>,
    command: &Command,
) -> Result<WorkflowInstance, Error> {
    let instance_id = command.workflow_instance_id.ok_or_else(|| {
        Error::InvalidCommandParams(format!(
            "command {} of type {} carries no workflow instance id",
            command.id, command.command_type
        ))
    })?;
    store
        .get_workflow_instance(instance_id)
        .await?
        .ok_or(Error::InstanceNotFound(instance_id))
}
