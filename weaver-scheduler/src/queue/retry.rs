use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use weaver_common::task::TaskPriority;

use crate::config::SchedulerConfig;

/// Ascending backoff multipliers applied to the configured base
/// interval. A failure count at or past the end of the table stays at
/// the last entry; the delay never grows beyond it.
const BACKOFF_MULTIPLIERS: [u32; 8] = [1, 2, 3, 5, 10, 20, 40, 100];

#[derive(Clone, Debug)]
pub struct RetryEntry {
    pub priority: TaskPriority,
    pub failure_count: u32,
    pub eligible_at: DateTime<Utc>,
}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RetryEntry {}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.eligible_at
            .cmp(&other.eligible_at)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

/// Delay queue for tasks whose dispatch failed (worker unavailable,
/// network refusal). Entries become eligible for another attempt after
/// a bounded backoff; dispatch failures are transient and never fail
/// the workflow.
pub struct FailedDispatchRetryQueue {
    base_interval: Duration,
    heap: Mutex<BinaryHeap<Reverse<RetryEntry>>>,
}

impl FailedDispatchRetryQueue {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Base interval comes from the injected scheduler config.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.dispatch_retry_base())
    }

    /// Delay before the next attempt for a task that has failed
    /// dispatch `failure_count` times already.
    pub fn backoff_delay(&self, failure_count: u32) -> Duration {
        let index = (failure_count as usize).min(BACKOFF_MULTIPLIERS.len() - 1);
        self.base_interval * BACKOFF_MULTIPLIERS[index] as i32
    }

    /// Parks a failed dispatch until its backoff elapses.
    pub async fn put(&self, priority: TaskPriority, failure_count: u32, now: DateTime<Utc>) {
        let eligible_at = now + self.backoff_delay(failure_count);
        debug!(
            "Retry queue: task {} (failure {}) eligible at {}",
            priority.task_id, failure_count, eligible_at
        );
        self.heap.lock().await.push(Reverse(RetryEntry {
            priority,
            failure_count,
            eligible_at,
        }));
    }

    /// All entries whose backoff has elapsed, in eligibility order.
    pub async fn drain_eligible(&self, now: DateTime<Utc>) -> Vec<RetryEntry> {
        let mut heap = self.heap.lock().await;
        let mut eligible = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.eligible_at > now {
                break;
            }
            let Some(Reverse(entry)) = heap.pop() else {
                break;
            };
            eligible.push(entry);
        }
        eligible
    }

    /// When the dispatcher should wake next, if anything is parked.
    pub async fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.heap
            .lock()
            .await
            .peek()
            .map(|Reverse(entry)| entry.eligible_at)
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }
}
