use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use weaver_common::dependent::{
    DependResult, DependentFailurePolicy, DependentItem, DependentRelation, DependentResultKey,
};
use weaver_common::error::Error;
use weaver_common::store::RunHistoryStore;
use weaver_common::workflow::WorkflowInstance;

use crate::config::SchedulerConfig;

use super::interval::expand_date_value;

/// Where the evaluation stands: which workflow/task owns the dependent
/// task, and the instant windows are computed against.
#[derive(Clone, Debug)]
pub struct DependencyContext {
    pub workflow_definition_code: i64,
    pub workflow_instance_id: i32,
    pub task_code: i64,
    /// Schedule time of the current instance, falling back to its
    /// start time. Date windows and the failure grace period are
    /// measured from here.
    pub reference: DateTime<Utc>,
    pub test_flag: bool,
}

/// Evaluates a dependency expression (AND/OR over dependent items with
/// date-window selection) against historical run results. Read-only
/// against history; each waiting task owns its own resolver, so the
/// result cache is never shared.
pub struct DependencyResolver {
    items: Vec<DependentItem>,
    relation: DependentRelation,
    context: DependencyContext,
    history: Arc<dyn RunHistoryStore>,
    /// Only decided results (SUCCESS/FAILED) are cached; WAITING items
    /// are re-queried on the next poll.
    cache: HashMap<DependentResultKey, DependResult>,
}

impl DependencyResolver {
    pub fn new(
        items: Vec<DependentItem>,
        relation: DependentRelation,
        context: DependencyContext,
        history: Arc<dyn RunHistoryStore>,
    ) -> Self {
        Self {
            items,
            relation,
            context,
            history,
            cache: HashMap::new(),
        }
    }

    pub fn context(&self) -> &DependencyContext {
        &self.context
    }

    /// Resolves every item, then combines. The whole item set is
    /// evaluated on every call (no lazy short-circuit) so that decided
    /// items land in the cache before the finish decision.
    pub async fn evaluate(&mut self) -> Result<DependResult, Error> {
        let mut results = Vec::with_capacity(self.items.len());
        for item in self.items.clone() {
            let result = self.resolve_item(&item).await?;
            if result.is_decided() {
                self.cache.insert(item.result_key(), result);
            }
            results.push(result);
        }
        let combined = combine(self.relation, &results);
        debug!(
            "Dependency [{}/{}]: {:?} over {} items -> {}",
            self.context.workflow_definition_code,
            self.context.task_code,
            self.relation,
            results.len(),
            combined
        );
        Ok(combined)
    }

    async fn resolve_item(&mut self, item: &DependentItem) -> Result<DependResult, Error> {
        if let Some(cached) = self.cache.get(&item.result_key()) {
            return Ok(*cached);
        }

        // Bootstrap rule: a workflow cannot depend on a prior run of
        // itself that does not exist yet.
        if self.is_self_dependent(item) && self.is_first_instance().await? {
            debug!(
                "Dependency [{}/{}]: self-dependent item on first-ever instance, short-circuit SUCCESS",
                self.context.workflow_definition_code, self.context.task_code
            );
            return Ok(DependResult::Success);
        }

        let mut worst = DependResult::Success;
        for window in expand_date_value(item.date_value, self.context.reference) {
            let run = self.latest_run_in(item.definition_code, window).await?;
            let Some(run) = run else {
                // Nothing has ever run in this window; nothing further
                // to learn from the remaining windows.
                return Ok(DependResult::Waiting);
            };
            let window_result = self.run_result(item, &run).await?;
            worst = worst.worst(window_result);
            if worst == DependResult::Failed {
                break;
            }
        }
        Ok(worst)
    }

    fn is_self_dependent(&self, item: &DependentItem) -> bool {
        item.definition_code == self.context.workflow_definition_code
            && item
                .dep_task_code
                .is_none_or(|code| code == self.context.task_code)
    }

    /// True when the current instance is the first-ever run of its
    /// definition: earliest by schedule time, falling back to earliest
    /// by start time when nothing was ever scheduled.
    async fn is_first_instance(&self) -> Result<bool, Error> {
        let first = match self
            .history
            .first_scheduled_run(self.context.workflow_definition_code)
            .await?
        {
            Some(run) => Some(run),
            None => {
                self.history
                    .first_manual_run(self.context.workflow_definition_code)
                    .await?
            }
        };
        Ok(match first {
            Some(run) => run.id == self.context.workflow_instance_id,
            None => true,
        })
    }

    /// Most recent matching prior run in the window: the later-by-id of
    /// the last scheduled run and the last manual run.
    async fn latest_run_in(
        &self,
        definition_code: i64,
        window: weaver_common::dependent::DateInterval,
    ) -> Result<Option<WorkflowInstance>, Error> {
        let scheduled = self
            .history
            .last_scheduled_run_in_interval(definition_code, window, self.context.test_flag)
            .await?;
        let manual = self
            .history
            .last_manual_run_in_interval(definition_code, window, self.context.test_flag)
            .await?;
        Ok(match (scheduled, manual) {
            (Some(s), Some(m)) => Some(if s.id >= m.id { s } else { m }),
            (Some(s), None) => Some(s),
            (None, Some(m)) => Some(m),
            (None, None) => None,
        })
    }

    async fn run_result(
        &self,
        item: &DependentItem,
        run: &WorkflowInstance,
    ) -> Result<DependResult, Error> {
        if !run.state.is_finished() {
            return Ok(DependResult::Waiting);
        }

        match item.dep_task_code {
            // "All tasks": the run's own verdict decides.
            None => Ok(if run.state == weaver_common::workflow::WorkflowExecutionStatus::Success {
                DependResult::Success
            } else {
                DependResult::Failed
            }),
            Some(task_code) => {
                let task = self
                    .history
                    .task_instance_in_run(run.id, task_code, self.context.test_flag)
                    .await?;
                Ok(match task {
                    // The finished run never produced this task.
                    None => DependResult::Failed,
                    Some(task) if task.state.is_finished() => {
                        if task.state.is_success() {
                            DependResult::Success
                        } else {
                            DependResult::Failed
                        }
                    }
                    Some(_) => DependResult::Waiting,
                })
            }
        }
    }
}

/// Combines fully-resolved item results. AND: all SUCCESS concludes
/// SUCCESS, any FAILED concludes FAILED, else WAITING. OR: any SUCCESS
/// concludes SUCCESS, all FAILED concludes FAILED, else WAITING.
pub fn combine(relation: DependentRelation, results: &[DependResult]) -> DependResult {
    let succeeded = results.iter().filter(|r| **r == DependResult::Success).count();
    let failed = results.iter().filter(|r| **r == DependResult::Failed).count();
    match relation {
        DependentRelation::And => {
            if failed > 0 {
                DependResult::Failed
            } else if succeeded == results.len() {
                DependResult::Success
            } else {
                DependResult::Waiting
            }
        }
        DependentRelation::Or => {
            if succeeded > 0 {
                DependResult::Success
            } else if failed == results.len() && !results.is_empty() {
                DependResult::Failed
            } else {
                DependResult::Waiting
            }
        }
    }
}

/// Whether polling can stop. WAITING always keeps polling. FAILED under
/// `WaitOnFailure` keeps polling until `waiting_window` has elapsed
/// since the reference instant, then gives up; every other case is
/// final immediately.
pub fn finish(
    result: DependResult,
    policy: DependentFailurePolicy,
    waiting_window: Duration,
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    match result {
        DependResult::Waiting => false,
        DependResult::Failed if policy == DependentFailurePolicy::WaitOnFailure => {
            now - reference > waiting_window
        }
        _ => true,
    }
}

/// Re-polls a resolver until the finish decision says stop or the
/// owning task is cancelled. The cancellation flag is checked on every
/// iteration, not only at entry.
pub struct DependencyPoller {
    resolver: DependencyResolver,
    policy: DependentFailurePolicy,
    waiting_window: Duration,
    poll_interval: std::time::Duration,
    cancelled: Arc<AtomicBool>,
}

impl DependencyPoller {
    pub fn new(
        resolver: DependencyResolver,
        policy: DependentFailurePolicy,
        waiting_window: Duration,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            resolver,
            policy,
            waiting_window,
            poll_interval,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Poll interval comes from the injected scheduler config.
    pub fn from_config(
        resolver: DependencyResolver,
        policy: DependentFailurePolicy,
        waiting_window: Duration,
        config: &SchedulerConfig,
    ) -> Self {
        Self::new(resolver, policy, waiting_window, config.dependency_poll_interval())
    }

    /// Handle the instance driver uses to interrupt the wait when the
    /// workflow is stopped or paused.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Returns `None` when cancelled, otherwise the final combined
    /// result once the finish decision fires.
    pub async fn poll_until_finished(&mut self) -> Result<Option<DependResult>, Error> {
        let reference = self.resolver.context().reference;
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(None);
            }
            let result = self.resolver.evaluate().await?;
            if finish(result, self.policy, self.waiting_window, reference, Utc::now()) {
                return Ok(Some(result));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
