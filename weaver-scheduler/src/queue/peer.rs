use std::cmp::Ordering;
use std::collections::BinaryHeap;

use weaver_common::task::TaskInstance;

/// Heap entry implementing the peer comparator. This ordering is
/// deliberately distinct from `TaskPriority`'s global dispatch chain:
/// it is scoped to one workflow instance, so workflow-level fields
/// never participate. Task-group priority (descending) applies only
/// when both tasks sit in the same task group; otherwise plain
/// task-instance priority decides, with submit time and id as the
/// deterministic tie-break.
struct PeerEntry(TaskInstance);

impl PeerEntry {
    fn cmp_priority(&self, other: &Self) -> Ordering {
        let a = &self.0;
        let b = &other.0;
        let primary = match (a.task_group_id, b.task_group_id) {
            (Some(x), Some(y)) if x == y => b.task_group_priority.cmp(&a.task_group_priority),
            _ => a.priority.cmp(&b.priority),
        };
        primary
            .then_with(|| a.submit_time.cmp(&b.submit_time))
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl PartialEq for PeerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_priority(other) == Ordering::Equal
    }
}

impl Eq for PeerEntry {}

impl PartialOrd for PeerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeerEntry {
    // BinaryHeap is a max-heap; invert so the best-priority task
    // surfaces first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_priority(other).reverse()
    }
}

/// Priority queue over the task instances of a single workflow
/// instance, used to present the next-runnable set in intra-instance
/// order. Not shared across instances, so it needs no locking.
#[derive(Default)]
pub struct PeerTaskPriorityQueue {
    heap: BinaryHeap<PeerEntry>,
}

impl PeerTaskPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, task: TaskInstance) {
        self.heap.push(PeerEntry(task));
    }

    pub fn take(&mut self) -> Option<TaskInstance> {
        self.heap.pop().map(|e| e.0)
    }

    pub fn peek(&self) -> Option<&TaskInstance> {
        self.heap.peek().map(|e| &e.0)
    }

    pub fn contains(&self, task_instance_id: i32) -> bool {
        self.heap.iter().any(|e| e.0.id == task_instance_id)
    }

    pub fn remove(&mut self, task_instance_id: i32) -> bool {
        let before = self.heap.len();
        let remaining: Vec<PeerEntry> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter(|e| e.0.id != task_instance_id)
            .collect();
        self.heap = remaining.into();
        self.heap.len() != before
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use weaver_common::task::TaskExecutionStatus;
    use weaver_common::workflow::ExecutionPriority;

    use super::*;

    fn instance(
        id: i32,
        priority: ExecutionPriority,
        task_group_id: Option<i32>,
        task_group_priority: i32,
    ) -> TaskInstance {
        TaskInstance {
            id,
            workflow_instance_id: 1,
            task_code: id as i64,
            task_definition_version: 1,
            name: format!("task-{id}"),
            task_type: "SHELL".to_string(),
            state: TaskExecutionStatus::Pending,
            valid: true,
            priority,
            task_group_id,
            task_group_priority,
            worker_group: "default".to_string(),
            host: None,
            retry_times: 0,
            submit_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32 % 60).unwrap()),
            start_time: None,
            end_time: None,
            test_flag: false,
        }
    }

    #[test]
    fn plain_priority_orders_ungrouped_tasks() {
        let mut queue = PeerTaskPriorityQueue::new();
        queue.put(instance(1, ExecutionPriority::Low, None, 0));
        queue.put(instance(2, ExecutionPriority::Highest, None, 0));
        queue.put(instance(3, ExecutionPriority::Medium, None, 0));

        assert_eq!(queue.take().unwrap().id, 2);
        assert_eq!(queue.take().unwrap().id, 3);
        assert_eq!(queue.take().unwrap().id, 1);
    }

    #[test]
    fn same_group_uses_group_priority_descending() {
        let mut queue = PeerTaskPriorityQueue::new();
        // Same group: the larger group priority wins even though its
        // task-instance priority is worse.
        queue.put(instance(1, ExecutionPriority::Highest, Some(7), 1));
        queue.put(instance(2, ExecutionPriority::Lowest, Some(7), 9));

        assert_eq!(queue.take().unwrap().id, 2);
        assert_eq!(queue.take().unwrap().id, 1);
    }

    #[test]
    fn different_groups_fall_back_to_task_priority() {
        let mut queue = PeerTaskPriorityQueue::new();
        queue.put(instance(1, ExecutionPriority::High, Some(1), 0));
        queue.put(instance(2, ExecutionPriority::Medium, Some(2), 100));

        assert_eq!(queue.take().unwrap().id, 1);
    }

    #[test]
    fn remove_and_contains_track_membership() {
        let mut queue = PeerTaskPriorityQueue::new();
        queue.put(instance(1, ExecutionPriority::Medium, None, 0));
        queue.put(instance(2, ExecutionPriority::Medium, None, 0));

        assert!(queue.contains(1));
        assert!(queue.remove(1));
        assert!(!queue.contains(1));
        assert!(!queue.remove(1));
        assert_eq!(queue.len(), 1);
    }
}
