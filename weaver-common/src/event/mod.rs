use tokio::sync::mpsc;
use uuid::Uuid;

use crate::task::TaskExecutionStatus;
use crate::workflow::{WorkflowExecutionStatus, WorkflowInstance};

/// Lifecycle events flowing through one workflow instance's bus.
#[derive(Clone, Debug)]
pub enum WorkflowEvent {
    WorkflowStateChange {
        workflow_instance_id: i32,
        from: WorkflowExecutionStatus,
        to: WorkflowExecutionStatus,
    },
    TaskStateChange {
        workflow_instance_id: i32,
        task_code: i64,
        from: TaskExecutionStatus,
        to: TaskExecutionStatus,
    },
    TaskDispatchFailed {
        workflow_instance_id: i32,
        task_code: i64,
        failure_count: u32,
    },
}

/// Per-instance event bus. Each assembled executable unit gets a fresh,
/// empty bus; the per-instance runnable drains it.
#[derive(Debug)]
pub struct WorkflowEventBus {
    id: Uuid,
    tx: mpsc::UnboundedSender<WorkflowEvent>,
    rx: mpsc::UnboundedReceiver<WorkflowEvent>,
}

impl WorkflowEventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            tx,
            rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // The receiver lives as long as the bus, so this cannot fail.
        let _ = self.tx.send(event);
    }

    /// Cloneable handle for producers that outlive the assembly step.
    pub fn publisher(&self) -> mpsc::UnboundedSender<WorkflowEvent> {
        self.tx.clone()
    }

    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WorkflowEvent> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for WorkflowEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook invoked at workflow lifecycle boundaries. Implementations must
/// not block.
pub trait WorkflowLifecycleListener: Send + Sync {
    fn on_assembled(&self, instance: &WorkflowInstance);

    fn on_event(&self, _event: &WorkflowEvent) {}
}

/// Default listener: writes lifecycle transitions to the log.
pub struct LoggingLifecycleListener;

impl WorkflowLifecycleListener for LoggingLifecycleListener {
    fn on_assembled(&self, instance: &WorkflowInstance) {
        tracing::info!(
            "Workflow [{}]: assembled instance '{}' in state {} (run {})",
            instance.id,
            instance.name,
            instance.state,
            instance.run_times
        );
    }

    fn on_event(&self, event: &WorkflowEvent) {
        tracing::debug!("Workflow event: {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_bus_is_empty_and_delivers_in_order() {
        let mut bus = WorkflowEventBus::new();
        assert!(bus.is_empty());

        bus.publish(WorkflowEvent::TaskDispatchFailed {
            workflow_instance_id: 1,
            task_code: 10,
            failure_count: 1,
        });
        bus.publish(WorkflowEvent::TaskDispatchFailed {
            workflow_instance_id: 1,
            task_code: 11,
            failure_count: 2,
        });

        assert!(!bus.is_empty());
        match bus.recv().await {
            Some(WorkflowEvent::TaskDispatchFailed { task_code, .. }) => assert_eq!(task_code, 10),
            other => panic!("unexpected event: {other:?}"),
        }
        match bus.try_recv() {
            Some(WorkflowEvent::TaskDispatchFailed { task_code, .. }) => assert_eq!(task_code, 11),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(bus.is_empty());
    }
}
