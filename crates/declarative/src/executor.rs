//! Submission engine - realizes a plan against a [`ResourceApi`]

use crate::context::{CancelToken, ProgressCallback, ResourceApi};
use crate::diff;
use crate::error::{ApiError, PlanError};
use crate::planner::ExecutionPlan;
use crate::resource::ResourceDeclaration;
use crate::retry::{RetryCallback, with_retry};
use crate::types::{ExecuteOptions, ExecuteSummary, ResourceId, SubmissionResult};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Final state of one declaration after a run
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub id: ResourceId,
    pub result: SubmissionResult,
    /// Attempts spent, zero when never submitted
    pub attempts: u32,
    /// Object as stored by the remote system after success
    pub realized: Option<Value>,
}

/// Outcomes of a run, in plan order
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionReport {
    outcomes: Vec<Outcome>,
}

impl SubmissionReport {
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Look up the result for one declaration
    pub fn result(&self, id: &ResourceId) -> Option<&SubmissionResult> {
        self.outcome(id).map(|o| &o.result)
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    /// Map every declaration to its result
    pub fn to_map(&self) -> HashMap<ResourceId, SubmissionResult> {
        self.outcomes
            .iter()
            .map(|o| (o.id.clone(), o.result.clone()))
            .collect()
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for outcome in &self.outcomes {
            summary.add_result(&outcome.result);
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_success())
    }

    /// Check whether the run stopped early on cancellation
    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.result, SubmissionResult::Cancelled))
    }
}

/// Plan and submit a set of declarations.
///
/// Planning errors (cycles, unknown references) return before any call to
/// the remote system.
pub fn submit(
    declarations: Vec<ResourceDeclaration>,
    api: Arc<dyn ResourceApi>,
    opts: &ExecuteOptions,
    progress: &dyn ProgressCallback,
    cancel: &CancelToken,
) -> Result<SubmissionReport, PlanError> {
    let plan = ExecutionPlan::resolve(declarations)?;
    Ok(execute(&plan, api, opts, progress, cancel))
}

/// Submit with default options and no progress reporting
pub fn submit_simple(
    declarations: Vec<ResourceDeclaration>,
    api: Arc<dyn ResourceApi>,
) -> Result<SubmissionReport, PlanError> {
    submit(
        declarations,
        api,
        &ExecuteOptions::default(),
        &crate::context::NoProgress,
        &CancelToken::new(),
    )
}

/// Execute a resolved plan.
///
/// With `jobs == 1` declarations are submitted one at a time in plan order.
/// Otherwise each dependency rank is submitted on a rayon pool and the next
/// rank starts once the whole rank has finished.
pub fn execute(
    plan: &ExecutionPlan,
    api: Arc<dyn ResourceApi>,
    opts: &ExecuteOptions,
    progress: &dyn ProgressCallback,
    cancel: &CancelToken,
) -> SubmissionReport {
    let runner = Runner {
        plan,
        api,
        opts,
        progress,
        cancel,
    };
    let mut slots: Vec<Option<Outcome>> = vec![None; plan.len()];

    progress.on_start(plan.len());

    let pool = if opts.jobs > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(opts.jobs).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Failed to create thread pool ({e}); submitting sequentially");
                None
            }
        }
    } else {
        None
    };

    match pool {
        Some(pool) => {
            for rank in plan.ranks() {
                let done: Vec<(usize, Outcome)> = pool.install(|| {
                    rank.par_iter()
                        .map(|&pos| (pos, runner.process(pos, &slots)))
                        .collect()
                });
                for (pos, outcome) in done {
                    slots[pos] = Some(outcome);
                }
            }
        }
        None => {
            for pos in 0..plan.len() {
                let outcome = runner.process(pos, &slots);
                slots[pos] = Some(outcome);
            }
        }
    }

    progress.on_finish();

    SubmissionReport {
        outcomes: slots.into_iter().flatten().collect(),
    }
}

struct Runner<'a> {
    plan: &'a ExecutionPlan,
    api: Arc<dyn ResourceApi>,
    opts: &'a ExecuteOptions,
    progress: &'a dyn ProgressCallback,
    cancel: &'a CancelToken,
}

impl Runner<'_> {
    /// Decide and report the outcome of the node at `pos`.
    ///
    /// `slots` holds the outcomes of every earlier rank.
    fn process(&self, pos: usize, slots: &[Option<Outcome>]) -> Outcome {
        let node = &self.plan.nodes()[pos];
        let id = node.id();

        let (result, attempts, realized) = if self.cancel.is_cancelled() {
            (SubmissionResult::Cancelled, 0, None)
        } else if let Some(dependency) = self.failed_dependency(&node.dependencies, slots) {
            (SubmissionResult::BlockedByDependency { dependency }, 0, None)
        } else {
            self.progress.on_resource_start(id);
            self.submit_one(&node.declaration, slots)
        };

        match &result {
            SubmissionResult::Failed { category, reason } => {
                log::error!("{id}: {category} failure after {attempts} attempt(s): {reason}")
            }
            SubmissionResult::BlockedByDependency { dependency } => {
                log::warn!("{id}: blocked by {dependency}")
            }
            other => log::info!("{id}: {}", other.label()),
        }
        self.progress.on_resource_complete(id, &result);

        Outcome {
            id: id.clone(),
            result,
            attempts,
            realized,
        }
    }

    fn failed_dependency(&self, dependencies: &[usize], slots: &[Option<Outcome>]) -> Option<ResourceId> {
        dependencies.iter().find_map(|&dep| match &slots[dep] {
            Some(outcome) if outcome.result.is_success() => None,
            _ => Some(self.plan.nodes()[dep].id().clone()),
        })
    }

    fn submit_one(
        &self,
        decl: &ResourceDeclaration,
        slots: &[Option<Outcome>],
    ) -> (SubmissionResult, u32, Option<Value>) {
        let desired = match decl.render(|reference| self.realized_value(reference, slots)) {
            Ok(desired) => desired,
            Err(e) => {
                return (
                    SubmissionResult::Failed {
                        category: e.category,
                        reason: e.message,
                    },
                    0,
                    None,
                );
            }
        };

        let callback = ProgressRetry {
            id: &decl.id,
            progress: self.progress,
        };
        let created = Cell::new(false);
        let outcome = with_retry(&self.opts.retry, Some(&callback), || {
            reconcile_once(&self.api, &decl.id, &desired, self.opts.call_timeout, &created)
        });

        match outcome {
            Ok(((result, realized), attempts)) => (result, attempts, Some(realized)),
            Err(e) => (
                SubmissionResult::Failed {
                    category: e.category(),
                    reason: e.error.message,
                },
                e.attempts,
                None,
            ),
        }
    }

    /// Value of a referenced field in the realized object of its target
    fn realized_value(
        &self,
        reference: &crate::resource::FieldReference,
        slots: &[Option<Outcome>],
    ) -> Result<Value, ApiError> {
        let realized = self
            .plan
            .position(&reference.target)
            .and_then(|pos| slots[pos].as_ref())
            .and_then(|outcome| outcome.realized.as_ref())
            .ok_or_else(|| ApiError::reference(format!("{} has not been realized", reference.target)))?;

        reference.field.lookup(realized).cloned().ok_or_else(|| {
            ApiError::reference(format!(
                "{} has no field {} (needed at {})",
                reference.target, reference.field, reference.at
            ))
        })
    }
}

struct ProgressRetry<'a> {
    id: &'a ResourceId,
    progress: &'a dyn ProgressCallback,
}

impl RetryCallback for ProgressRetry<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ApiError, delay: Duration) {
        self.progress.on_retry(self.id, attempt, max_attempts, error, delay);
    }
}

/// One idempotent attempt: read, then create or update only if needed.
///
/// `created` is set once a create has been sent for `id`. A create whose
/// answer was lost may still have been stored, so a later attempt that
/// finds the object still reports it as accepted.
fn reconcile_once(
    api: &Arc<dyn ResourceApi>,
    id: &ResourceId,
    desired: &Value,
    timeout: Option<Duration>,
    created: &Cell<bool>,
) -> Result<(SubmissionResult, Value), ApiError> {
    let live = {
        let id = id.clone();
        call_with_timeout(api, timeout, "get", move |api| api.get(&id))?
    };

    let (result, realized) = match live {
        None => {
            log::debug!("{id}: not found, creating");
            created.set(true);
            let (id, body) = (id.clone(), desired.clone());
            let stored = call_with_timeout(api, timeout, "create", move |api| api.create(&id, &body))?;
            (SubmissionResult::Accepted, stored)
        }
        Some(live) if diff::is_in_sync(desired, &live) => (SubmissionResult::Unchanged, live),
        Some(live) => {
            log::debug!("{id}: {} field(s) differ, updating", diff::drift(desired, &live).len());
            let (id, body) = (id.clone(), diff::merge(&live, desired));
            let stored = call_with_timeout(api, timeout, "update", move |api| api.update(&id, &body))?;
            (SubmissionResult::Updated, stored)
        }
    };

    if created.get() && result != SubmissionResult::Accepted {
        log::debug!("{id}: found after an unanswered create");
        return Ok((SubmissionResult::Accepted, realized));
    }
    Ok((result, realized))
}

/// Run one remote call, giving up after `timeout`.
///
/// The call runs on its own thread; a call that outlives its deadline is
/// abandoned and its eventual answer dropped.
fn call_with_timeout<T, F>(
    api: &Arc<dyn ResourceApi>,
    timeout: Option<Duration>,
    what: &str,
    call: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ResourceApi) -> Result<T, ApiError> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return call(api.as_ref());
    };

    let (tx, rx) = mpsc::channel();
    let api = Arc::clone(api);
    thread::Builder::new()
        .name(format!("cascade-{what}"))
        .spawn(move || {
            let _ = tx.send(call(api.as_ref()));
        })
        .map_err(|e| ApiError::transient(format!("failed to start {what} call: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ApiError::timeout(format!(
            "{what} did not answer within {:.1}s",
            timeout.as_secs_f64()
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(ApiError::transient(format!("{what} call ended without an answer"))),
    }
}
