//! Execution coordinator: dispatch selected cases, collect their results, notify hooks.
//!
//! ## Model
//!
//! Every selected case becomes an independent task in a [`JoinSet`]; at most `parallelism` tasks are
//! in flight. Completed tasks are drained from the set by the coordinator loop, which is the only code
//! that calls hooks or touches the [`FilterUsage`] arena. Execution tasks only ever see immutable
//! inputs and hand their [`ExecutionReport`] back through the set, so hook calls never overlap and the
//! usage arena has a single writer.
//!
//! ## Accounting
//!
//! Every entry of the selection ends up with exactly one `got_test_case` / `got_result` pair:
//! - dispatched cases report whatever the executor returned (a panicking executor counts as broken);
//! - programs that could not be enumerated report their listing failure as broken, without running;
//! - cases still waiting when the run is cancelled report a cancellation skip;
//! - a dispatched case whose task vanished is reported broken once everything else has settled.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use testdrive_core::{Outcome, TestCase, TestProgram};
use tokio::task::JoinSet;

use super::cancel::CancelToken;
use super::hooks::RunHooks;
use super::resolver::{FilterUsage, SelectedCase, Selection, Target};
use crate::interfaces::{ExecutionContext, ExecutionReport, TestExecutor};

/// Reason given to cases that never started because the run was cancelled.
pub const CANCELLED_BEFORE_START: &str = "Run cancelled before the test case started";

/// Reason given to dispatched cases whose result never came back.
///
/// The outer task spawned by `Coordinator::dispatch` does nothing but await the executor task, so it
/// only fails when the runtime aborts it, for example while shutting down underneath a run.
pub const EXECUTION_LOST: &str = "Test case execution was lost";

/// Final result of one case, as reported to the hooks.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub program: Arc<TestProgram>,
    pub case_name: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// What the coordinator hands back once every selected case is accounted for.
#[derive(Debug)]
pub struct CoordinatorReport {
    /// One entry per selected case, in completion order.
    pub outcomes: Vec<CaseOutcome>,
    pub usage: FilterUsage,
    pub cancelled: bool,
}

type Completion = (usize, ExecutionReport);

pub struct Coordinator {
    executor: Arc<dyn TestExecutor>,
    context: Arc<ExecutionContext>,
    parallelism: usize,
    cancel: CancelToken,
}

impl Coordinator {
    /// ## Parameters
    /// - `parallelism`: maximum number of cases in flight; values below 1 are treated as 1.
    pub fn new(
        executor: Arc<dyn TestExecutor>,
        context: Arc<ExecutionContext>,
        parallelism: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            executor,
            context,
            parallelism: parallelism.max(1),
            cancel,
        }
    }

    /// Run `selection`, recording filter usage in `usage` as cases are dispatched.
    ///
    /// Returns only after every selected case has produced its result.
    #[tracing::instrument(skip_all, fields(selected = selection.len(), parallelism = self.parallelism))]
    pub async fn run(
        &self,
        selection: Selection,
        mut usage: FilterUsage,
        hooks: &mut dyn RunHooks,
    ) -> CoordinatorReport {
        let mut pending: VecDeque<SelectedCase> = selection.into_iter().collect();
        let mut dispatched: BTreeMap<usize, SelectedCase> = BTreeMap::new();
        let mut in_flight: JoinSet<Completion> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut next_id = 0;
        let mut cancelled = false;

        loop {
            cancelled |= self.cancel.is_cancelled();
            while !cancelled && in_flight.len() < self.parallelism {
                let Some(entry) = pending.pop_front() else {
                    break;
                };

                hooks.got_test_case(&entry.program, entry.case_name());
                usage.mark(&entry.filters);

                match &entry.target {
                    Target::ListingFailure(reason) => {
                        let outcome = Outcome::broken(reason.clone());
                        outcomes.push(finish(hooks, &entry, outcome, Duration::ZERO));
                    }
                    Target::Case(case) => {
                        let id = next_id;
                        next_id += 1;
                        self.dispatch(&mut in_flight, id, Arc::clone(&entry.program), case.clone());
                        dispatched.insert(id, entry);
                    }
                }

                cancelled = self.cancel.is_cancelled();
            }

            if in_flight.is_empty() {
                if cancelled || pending.is_empty() {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !cancelled => {
                    tracing::info!(
                        in_flight = in_flight.len(),
                        pending = pending.len(),
                        "run cancelled; waiting for running test cases"
                    );
                    cancelled = true;
                }
                joined = in_flight.join_next() => match joined {
                    Some(Ok((id, report))) => match dispatched.remove(&id) {
                        Some(entry) => outcomes.push(finish(hooks, &entry, report.outcome, report.duration)),
                        None => tracing::error!(id, "result for a test case that was not dispatched"),
                    },
                    // Only reachable when the runtime aborts the outer task; the id is lost with it,
                    // so the case is settled with the leftovers below.
                    Some(Err(err)) => tracing::error!(error = %err, "test case task failed"),
                    None => {}
                },
            }
        }

        for entry in pending {
            hooks.got_test_case(&entry.program, entry.case_name());
            outcomes.push(finish(
                hooks,
                &entry,
                Outcome::skipped(CANCELLED_BEFORE_START),
                Duration::ZERO,
            ));
        }

        for entry in dispatched.into_values() {
            tracing::warn!(
                program = %entry.program.relative_path().display(),
                case = entry.case_name(),
                "no result received for dispatched test case"
            );
            outcomes.push(finish(hooks, &entry, Outcome::broken(EXECUTION_LOST), Duration::ZERO));
        }

        CoordinatorReport {
            outcomes,
            usage,
            cancelled,
        }
    }

    /// Spawn the execution of one case.
    ///
    /// The executor runs in its own task so that a panic surfaces as a `JoinError` for that case only;
    /// the outer task always completes with the case's id.
    fn dispatch(&self, in_flight: &mut JoinSet<Completion>, id: usize, program: Arc<TestProgram>, case: TestCase) {
        tracing::debug!(
            program = %program.relative_path().display(),
            case = case.name(),
            "dispatching test case"
        );

        let executor = Arc::clone(&self.executor);
        let context = Arc::clone(&self.context);
        let cancel = self.cancel.clone();

        in_flight.spawn(async move {
            let started = Instant::now();
            let execution = tokio::spawn(async move { executor.execute(&program, &case, &context, &cancel).await });
            let report = match execution.await {
                Ok(report) => report,
                Err(err) => ExecutionReport::new(
                    Outcome::broken(format!("Test case execution failed: {}", err)),
                    started.elapsed(),
                ),
            };
            (id, report)
        });
    }
}

fn finish(hooks: &mut dyn RunHooks, entry: &SelectedCase, outcome: Outcome, duration: Duration) -> CaseOutcome {
    tracing::debug!(
        program = %entry.program.relative_path().display(),
        case = entry.case_name(),
        result = %outcome.kind,
        "test case finished"
    );
    hooks.got_result(&entry.program, entry.case_name(), &outcome, duration);
    CaseOutcome {
        program: Arc::clone(&entry.program),
        case_name: entry.case_name().to_string(),
        outcome,
        duration,
    }
}
