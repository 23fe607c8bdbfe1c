use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tokio::sync::{Mutex, Notify};
use tracing::debug;
use weaver_common::error::Error;
use weaver_common::task::{TaskIdentity, TaskPriority};

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<TaskPriority>>,
    /// Source of truth for membership. `remove` only deletes from here;
    /// the heap entry becomes a tombstone skipped on take/peek.
    identities: HashSet<TaskIdentity>,
}

impl State {
    fn drop_tombstones(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.identities.contains(&top.identity()) {
                return;
            }
            self.heap.pop();
        }
    }
}

/// The global standby queue: every task instance of every workflow
/// instance on this master waits here until the dispatch pool takes
/// it. Safe for concurrent `put` from many instance drivers and
/// concurrent `take` from the dispatch pool; `take` parks rather than
/// spins when the queue is empty.
#[derive(Default)]
pub struct StandbyDispatchQueue {
    state: Mutex<State>,
    available: Notify,
}

impl StandbyDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one task for dispatch. The same task identity is never
    /// held twice; a duplicate put is a conflict the caller must
    /// handle, not a silent overwrite.
    pub async fn put(&self, priority: TaskPriority) -> Result<(), Error> {
        let identity = priority.identity();
        {
            let mut state = self.state.lock().await;
            if !state.identities.insert(identity.clone()) {
                return Err(Error::Conflict(format!(
                    "task {:?} is already awaiting dispatch",
                    identity
                )));
            }
            state.heap.push(Reverse(priority));
        }
        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the best-priority task, waiting while the
    /// queue is empty.
    pub async fn take(&self) -> TaskPriority {
        loop {
            {
                let mut state = self.state.lock().await;
                state.drop_tombstones();
                if let Some(Reverse(top)) = state.heap.pop() {
                    state.identities.remove(&top.identity());
                    // Notify holds a single permit, so puts that raced
                    // a consumer between its empty check and
                    // `notified()` can collapse into one wakeup. Pass
                    // the permit on while entries remain.
                    state.drop_tombstones();
                    if !state.heap.is_empty() {
                        self.available.notify_one();
                    }
                    return top;
                }
            }
            self.available.notified().await;
        }
    }

    /// Best-priority entry without removing it.
    pub async fn peek(&self) -> Option<TaskPriority> {
        let mut state = self.state.lock().await;
        state.drop_tombstones();
        state.heap.peek().map(|Reverse(p)| p.clone())
    }

    pub async fn contains(&self, identity: &TaskIdentity) -> bool {
        self.state.lock().await.identities.contains(identity)
    }

    /// Cancellation path: withdraw a task that has not been taken yet.
    pub async fn remove(&self, identity: &TaskIdentity) -> bool {
        let removed = self.state.lock().await.identities.remove(identity);
        if removed {
            debug!("Standby queue: removed {:?} before dispatch", identity);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.identities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use weaver_common::workflow::ExecutionPriority;

    use super::*;

    fn priority(workflow_priority: ExecutionPriority, instance_id: i32, task_id: i32) -> TaskPriority {
        TaskPriority {
            workflow_priority,
            workflow_instance_id: instance_id,
            task_priority: ExecutionPriority::Medium,
            task_group_priority: 0,
            task_id,
            task_code: task_id as i64,
            task_definition_version: 1,
            group_name: "default".to_string(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn take_returns_highest_priority_first() {
        let queue = StandbyDispatchQueue::new();
        queue.put(priority(ExecutionPriority::Low, 2, 20)).await.unwrap();
        queue.put(priority(ExecutionPriority::Highest, 1, 10)).await.unwrap();
        queue.put(priority(ExecutionPriority::Medium, 3, 30)).await.unwrap();

        assert_eq!(queue.take().await.task_id, 10);
        assert_eq!(queue.take().await.task_id, 30);
        assert_eq!(queue.take().await.task_id, 20);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let queue = StandbyDispatchQueue::new();
        queue.put(priority(ExecutionPriority::Medium, 1, 10)).await.unwrap();
        let err = queue
            .put(priority(ExecutionPriority::Highest, 1, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn removed_entries_are_never_taken() {
        let queue = StandbyDispatchQueue::new();
        let cancelled = priority(ExecutionPriority::Highest, 1, 10);
        queue.put(cancelled.clone()).await.unwrap();
        queue.put(priority(ExecutionPriority::Low, 2, 20)).await.unwrap();

        assert!(queue.remove(&cancelled.identity()).await);
        assert!(!queue.contains(&cancelled.identity()).await);
        assert_eq!(queue.peek().await.unwrap().task_id, 20);
        assert_eq!(queue.take().await.task_id, 20);
    }

    #[tokio::test]
    async fn concurrent_takers_drain_concurrent_puts() {
        let queue = Arc::new(StandbyDispatchQueue::new());
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.take().await.task_id })
            })
            .collect();

        tokio::task::yield_now().await;
        queue.put(priority(ExecutionPriority::Medium, 1, 10)).await.unwrap();
        queue.put(priority(ExecutionPriority::Medium, 2, 20)).await.unwrap();

        let mut taken = Vec::new();
        for consumer in consumers {
            let id = tokio::time::timeout(std::time::Duration::from_secs(5), consumer)
                .await
                .expect("a consumer parked with entries still queued")
                .unwrap();
            taken.push(id);
        }
        taken.sort();
        assert_eq!(taken, vec![10, 20]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn take_parks_until_a_put_arrives() {
        let queue = Arc::new(StandbyDispatchQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await.task_id })
        };

        tokio::task::yield_now().await;
        queue.put(priority(ExecutionPriority::Medium, 1, 42)).await.unwrap();
        assert_eq!(consumer.await.unwrap(), 42);
    }
}
