//! End-to-end command handling scenarios over the in-memory stores:
//! each test drives a persisted command through the registry and
//! inspects the assembled unit plus the resulting task-instance rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use weaver_common::command::{Command, CommandType};
use weaver_common::error::Error;
use weaver_common::store::WorkflowStore;
use weaver_common::store::memory::MemoryStore;
use weaver_common::task::{TaskExecutionStatus, TaskInstance};
use weaver_common::workflow::{
    ExecutionPriority, RetryPolicy, TaskDefinition, TaskDependType, TaskRelation, TimeoutPolicy,
    WorkflowDefinition, WorkflowExecutionStatus, WorkflowInstance,
};
use weaver_scheduler::config::SchedulerConfig;
use weaver_scheduler::handlers::CommandHandlerRegistry;

fn task(code: i64, name: &str) -> TaskDefinition {
    TaskDefinition {
        code,
        version: 1,
        name: name.to_string(),
        task_type: "SHELL".to_string(),
        priority: ExecutionPriority::Medium,
        retry_policy: RetryPolicy::default(),
        timeout_policy: TimeoutPolicy::default(),
        worker_group: "default".to_string(),
        task_group_id: None,
        task_group_priority: 0,
        task_params: serde_json::Value::Null,
    }
}

/// Linear workflow a -> b -> c, definition code 100.
fn linear_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        code: 100,
        version: 1,
        name: "etl".to_string(),
        project_code: 1,
        priority: ExecutionPriority::Medium,
        global_params: BTreeMap::from([("env".to_string(), "prod".to_string())]),
        tasks: vec![task(1, "a"), task(2, "b"), task(3, "c")],
        relations: vec![
            TaskRelation { pre_task_code: 1, post_task_code: 2 },
            TaskRelation { pre_task_code: 2, post_task_code: 3 },
        ],
    }
}

fn command(command_type: CommandType, instance_id: Option<i32>) -> Command {
    Command {
        id: 1,
        command_type,
        workflow_definition_code: 100,
        workflow_definition_version: 1,
        workflow_instance_id: instance_id,
        priority: ExecutionPriority::Medium,
        task_depend_type: TaskDependType::TaskPost,
        schedule_time: None,
        test_flag: false,
        params: serde_json::Value::Null,
    }
}

fn seeded_instance(id: i32, state: WorkflowExecutionStatus) -> WorkflowInstance {
    WorkflowInstance {
        id,
        workflow_definition_code: 100,
        workflow_definition_version: 1,
        name: "etl-run".to_string(),
        state,
        command_type: CommandType::Start,
        priority: ExecutionPriority::Medium,
        host: Some("10.0.0.1:5678".to_string()),
        run_times: 1,
        start_time: None,
        restart_time: None,
        end_time: None,
        schedule_time: None,
        global_params: BTreeMap::new(),
        variable_pool: serde_json::json!({"stale": true}),
        task_depend_type: TaskDependType::TaskPost,
        test_flag: false,
    }
}

fn seeded_task(instance_id: i32, code: i64, name: &str, state: TaskExecutionStatus) -> TaskInstance {
    TaskInstance {
        id: 0,
        workflow_instance_id: instance_id,
        task_code: code,
        task_definition_version: 1,
        name: name.to_string(),
        task_type: "SHELL".to_string(),
        state,
        valid: true,
        priority: ExecutionPriority::Medium,
        task_group_id: None,
        task_group_priority: 0,
        worker_group: "default".to_string(),
        host: None,
        retry_times: 0,
        submit_time: None,
        start_time: None,
        end_time: None,
        test_flag: false,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn registry_with(store: &Arc<MemoryStore>) -> CommandHandlerRegistry {
    init_tracing();
    store.insert_definition(linear_definition()).await;
    CommandHandlerRegistry::new(
        Arc::clone(store) as Arc<dyn WorkflowStore>,
        SchedulerConfig::default(),
    )
}

#[tokio::test]
async fn fresh_start_builds_full_graph_with_bare_nodes() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let mut cmd = command(CommandType::Start, None);
    cmd.params = serde_json::json!({"global_params": {"env": "staging", "owner": "ops"}});
    let unit = registry.handle(cmd).await.unwrap();

    assert_eq!(unit.workflow_instance.state, WorkflowExecutionStatus::Running);
    assert_eq!(unit.workflow_instance.run_times, 1);
    // Command params win on collision, definition params survive.
    assert_eq!(unit.workflow_instance.global_params["env"], "staging");
    assert_eq!(unit.workflow_instance.global_params["owner"], "ops");

    assert_eq!(unit.execution_graph.len(), 3);
    assert!(unit.execution_graph.nodes().all(|n| n.task_instance.is_none()));
    assert!(unit.event_bus.is_empty());

    let starts: Vec<&str> = unit.execution_graph.start_nodes().iter().map(|n| n.name()).collect();
    assert_eq!(starts, vec!["a"]);
}

#[tokio::test]
async fn scheduler_command_is_handled_like_start() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let unit = registry.handle(command(CommandType::Scheduler, None)).await.unwrap();
    assert_eq!(unit.execution_graph.len(), 3);
    assert_eq!(unit.workflow_instance.state, WorkflowExecutionStatus::Running);
}

#[tokio::test]
async fn start_from_explicit_node_restricts_to_forward_closure() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let mut cmd = command(CommandType::Start, None);
    cmd.params = serde_json::json!({"start_nodes": ["b"]});
    let unit = registry.handle(cmd).await.unwrap();

    assert_eq!(unit.execution_graph.len(), 2);
    assert!(unit.execution_graph.contains("b"));
    assert!(unit.execution_graph.contains("c"));
    assert!(!unit.execution_graph.contains("a"));
}

#[tokio::test]
async fn unknown_start_node_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let mut cmd = command(CommandType::Start, None);
    cmd.params = serde_json::json!({"start_nodes": ["ghost"]});
    let err = registry.handle(cmd).await.unwrap_err();
    assert!(matches!(err, Error::StartNodeNotInGraph(name) if name == "ghost"));
}

#[tokio::test]
async fn missing_definition_is_fatal() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let registry = CommandHandlerRegistry::new(
        Arc::clone(&store) as Arc<dyn WorkflowStore>,
        SchedulerConfig::default(),
    );

    let err = registry.handle(command(CommandType::Start, None)).await.unwrap_err();
    assert!(matches!(err, Error::DefinitionNotFound { code: 100, version: 1 }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn missing_instance_is_fatal_for_rerun() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let err = registry
        .handle(command(CommandType::RepeatRunning, Some(404)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(404)));
}

#[tokio::test]
async fn repeat_running_invalidates_every_prior_task_instance() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store.insert_instance(seeded_instance(0, WorkflowExecutionStatus::Failure)).await;
    for (code, name, state) in [
        (1, "a", TaskExecutionStatus::Success),
        (2, "b", TaskExecutionStatus::Failure),
        (3, "c", TaskExecutionStatus::Kill),
    ] {
        store.insert_task_instance(seeded_task(instance.id, code, name, state)).await;
    }

    let unit = registry
        .handle(command(CommandType::RepeatRunning, Some(instance.id)))
        .await
        .unwrap();

    assert_eq!(unit.workflow_instance.run_times, 2);
    assert_eq!(unit.workflow_instance.state, WorkflowExecutionStatus::Running);
    assert_eq!(unit.workflow_instance.variable_pool, serde_json::Value::Null);
    assert!(unit.workflow_instance.end_time.is_none());
    assert!(unit.workflow_instance.restart_time.is_some());

    // The whole DAG re-executes from scratch.
    assert_eq!(unit.execution_graph.len(), 3);
    assert!(unit.execution_graph.nodes().all(|n| n.task_instance.is_none()));

    let remaining_valid: Vec<TaskInstance> = store
        .all_task_instances(instance.id)
        .await
        .into_iter()
        .filter(|t| t.valid)
        .collect();
    assert!(remaining_valid.is_empty(), "no prior task instance may stay valid");
}

#[tokio::test]
async fn recover_failure_recreates_failed_task_and_downstream_only() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store.insert_instance(seeded_instance(0, WorkflowExecutionStatus::Failure)).await;
    let a = store
        .insert_task_instance(seeded_task(instance.id, 1, "a", TaskExecutionStatus::Success))
        .await;
    let b = store
        .insert_task_instance(seeded_task(instance.id, 2, "b", TaskExecutionStatus::Failure))
        .await;
    // c never ran.

    let unit = registry
        .handle(command(CommandType::StartFailureTaskProcess, Some(instance.id)))
        .await
        .unwrap();

    // Only b (recreated) and c (never ran) are in the graph.
    assert_eq!(unit.execution_graph.len(), 2);
    assert!(!unit.execution_graph.contains("a"));

    let recovered_b = unit.execution_graph.node("b").unwrap().task_instance.as_ref().unwrap();
    assert_ne!(recovered_b.id, b.id);
    assert_eq!(recovered_b.state, TaskExecutionStatus::Pending);
    assert!(unit.execution_graph.node("c").unwrap().task_instance.is_none());

    // a's successful instance is untouched; b's old row is invalid.
    let rows = store.all_task_instances(instance.id).await;
    let a_row = rows.iter().find(|t| t.id == a.id).unwrap();
    assert!(a_row.valid);
    assert_eq!(a_row.state, TaskExecutionStatus::Success);
    assert!(!rows.iter().find(|t| t.id == b.id).unwrap().valid);
}

#[tokio::test]
async fn recover_failure_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store.insert_instance(seeded_instance(0, WorkflowExecutionStatus::Failure)).await;
    store
        .insert_task_instance(seeded_task(instance.id, 1, "a", TaskExecutionStatus::Success))
        .await;
    store
        .insert_task_instance(seeded_task(instance.id, 2, "b", TaskExecutionStatus::Failure))
        .await;

    registry
        .handle(command(CommandType::StartFailureTaskProcess, Some(instance.id)))
        .await
        .unwrap();

    let valid_after_first: Vec<(i32, TaskExecutionStatus)> = store
        .all_task_instances(instance.id)
        .await
        .into_iter()
        .filter(|t| t.valid)
        .map(|t| (t.id, t.state))
        .collect();

    let unit = registry
        .handle(command(CommandType::StartFailureTaskProcess, Some(instance.id)))
        .await
        .unwrap();

    let valid_after_second: Vec<(i32, TaskExecutionStatus)> = store
        .all_task_instances(instance.id)
        .await
        .into_iter()
        .filter(|t| t.valid)
        .map(|t| (t.id, t.state))
        .collect();

    assert_eq!(valid_after_first, valid_after_second);
    // The second graph still schedules the pending recovery work
    // without minting new rows.
    assert_eq!(unit.execution_graph.len(), 2);
    assert!(unit.execution_graph.contains("b"));
    assert!(unit.execution_graph.contains("c"));
}

#[tokio::test]
async fn recover_failure_recreates_paused_tasks_as_pause_recovery() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store.insert_instance(seeded_instance(0, WorkflowExecutionStatus::Pause)).await;
    store
        .insert_task_instance(seeded_task(instance.id, 1, "a", TaskExecutionStatus::Success))
        .await;
    let b = store
        .insert_task_instance(seeded_task(instance.id, 2, "b", TaskExecutionStatus::Pause))
        .await;

    let unit = registry
        .handle(command(CommandType::StartFailureTaskProcess, Some(instance.id)))
        .await
        .unwrap();

    let recovered_b = unit.execution_graph.node("b").unwrap().task_instance.as_ref().unwrap();
    assert_ne!(recovered_b.id, b.id);
    assert_eq!(recovered_b.state, TaskExecutionStatus::Pending);
}

#[tokio::test]
async fn recover_failure_invalidates_stale_successors_of_a_failed_task() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    // b failed but c somehow finished successfully in a prior run;
    // c's result depends on b and cannot be trusted.
    let instance = store.insert_instance(seeded_instance(0, WorkflowExecutionStatus::Failure)).await;
    store
        .insert_task_instance(seeded_task(instance.id, 1, "a", TaskExecutionStatus::Success))
        .await;
    store
        .insert_task_instance(seeded_task(instance.id, 2, "b", TaskExecutionStatus::Failure))
        .await;
    let c = store
        .insert_task_instance(seeded_task(instance.id, 3, "c", TaskExecutionStatus::Success))
        .await;

    let unit = registry
        .handle(command(CommandType::StartFailureTaskProcess, Some(instance.id)))
        .await
        .unwrap();

    assert!(unit.execution_graph.contains("c"));
    assert!(unit.execution_graph.node("c").unwrap().task_instance.is_none());
    let rows = store.all_task_instances(instance.id).await;
    assert!(!rows.iter().find(|t| t.id == c.id).unwrap().valid);
}

#[tokio::test]
async fn failover_resumes_from_valid_rows_without_invalidation() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store
        .insert_instance(seeded_instance(0, WorkflowExecutionStatus::FailoverWait))
        .await;
    store
        .insert_task_instance(seeded_task(instance.id, 1, "a", TaskExecutionStatus::Success))
        .await;
    let b = store
        .insert_task_instance(seeded_task(instance.id, 2, "b", TaskExecutionStatus::Running))
        .await;

    let mut cmd = command(CommandType::RecoverToleranceFaultProcess, Some(instance.id));
    cmd.params = serde_json::json!({"recovered_state": "RUNNING"});
    let unit = registry.handle(cmd).await.unwrap();

    // State comes from the failover payload; ownership moves here.
    assert_eq!(unit.workflow_instance.state, WorkflowExecutionStatus::Running);
    assert_eq!(
        unit.workflow_instance.host.as_deref(),
        Some(SchedulerConfig::default().master_host.as_str())
    );

    // a succeeded and stays out; b resumes its existing row; c never ran.
    assert_eq!(unit.execution_graph.len(), 2);
    let resumed_b = unit.execution_graph.node("b").unwrap().task_instance.as_ref().unwrap();
    assert_eq!(resumed_b.id, b.id);
    assert_eq!(resumed_b.state, TaskExecutionStatus::Running);

    let rows = store.all_task_instances(instance.id).await;
    assert!(rows.iter().all(|t| t.valid), "failover never invalidates rows");
}

#[tokio::test]
async fn failover_without_payload_state_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry_with(&store).await;

    let instance = store
        .insert_instance(seeded_instance(0, WorkflowExecutionStatus::FailoverWait))
        .await;
    let err = registry
        .handle(command(CommandType::RecoverToleranceFaultProcess, Some(instance.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCommandParams(_)));
}
