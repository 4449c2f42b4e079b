//! Execution engine - applies a plan with dry-run, rollback and cancellation
//!
//! Entries are visited in plan order. With `jobs > 1` the plan is cut into
//! dependency waves and each wave runs on a rayon pool in batches whose
//! steps never share a resource key.

use crate::context::{ProgressCallback, RunContext};
use crate::graph::depth_waves;
use crate::id::StepId;
use crate::planner::{Plan, PlanEntry};
use crate::step::Undo;
use crate::types::{ResultStatus, StepResult, StepStatus};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// What happened to one applied step during rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    RolledBack,
    NotRevertible,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackRecord {
    pub id: StepId,
    pub outcome: RollbackOutcome,
}

/// Results of a run, in plan order, plus any rollback performed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub results: Vec<StepResult>,
    pub rollback: Vec<RollbackRecord>,
}

impl ExecutionReport {
    pub fn get(&self, id: &StepId) -> Option<&StepResult> {
        self.results.iter().find(|r| &r.id == id)
    }

    pub fn count(&self, status: ResultStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(ResultStatus::Failed) > 0
    }

    pub fn failed(&self) -> impl Iterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|r| r.status == ResultStatus::Failed)
    }

    pub fn was_rolled_back(&self) -> bool {
        !self.rollback.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ExecuteError {
    /// Cancellation was observed between steps; carries what had run
    #[error("execution cancelled after {} step(s)", .0.results.len())]
    Cancelled(Box<ExecutionReport>),

    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

/// Applies plans
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    dry_run: bool,
    rollback_on_failure: bool,
    jobs: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            dry_run: false,
            rollback_on_failure: false,
            jobs: 1,
        }
    }
}

enum ApplyOutcome {
    Applied(Option<Box<dyn Undo>>),
    Failed(String),
}

/// Mutable state of one run
struct Run<'p> {
    plan: &'p Plan,
    results: Vec<Option<StepResult>>,
    /// Applied entries in application order, with their undo data
    applied: Vec<(usize, Option<Box<dyn Undo>>)>,
}

impl<'p> Run<'p> {
    fn new(plan: &'p Plan) -> Self {
        Self {
            plan,
            results: vec![None; plan.len()],
            applied: Vec::new(),
        }
    }

    fn status_of(&self, id: &StepId) -> Option<ResultStatus> {
        let idx = self.plan.position(id)?;
        self.results[idx].as_ref().map(|r| r.status)
    }

    fn record(&mut self, idx: usize, result: StepResult, progress: &mut dyn ProgressCallback) {
        progress.on_step_complete(&result);
        self.results[idx] = Some(result);
    }

    fn has_failures(&self) -> bool {
        self.results
            .iter()
            .flatten()
            .any(|r| r.status == ResultStatus::Failed)
    }

    fn into_report(self, rollback: Vec<RollbackRecord>) -> ExecutionReport {
        ExecutionReport {
            results: self.results.into_iter().flatten().collect(),
            rollback,
        }
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    /// Maximum number of steps applied concurrently (1 = sequential)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn execute(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ExecutionReport, ExecuteError> {
        let ctx = ctx.clone().with_dry_run(ctx.dry_run || self.dry_run);
        let pool = if self.jobs > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.jobs)
                    .build()
                    .map_err(|e| ExecuteError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };

        let schedule = if pool.is_some() {
            waves(plan)
        } else {
            (0..plan.len()).map(|i| vec![i]).collect()
        };

        let mut run = Run::new(plan);
        for wave in schedule {
            let mut pending = Vec::new();
            for idx in wave {
                if ctx.is_cancelled() {
                    return Err(cancelled(run));
                }
                match self.settle_without_apply(&run, &plan.entries()[idx], &ctx) {
                    Some(result) => run.record(idx, result, progress),
                    None => pending.push(idx),
                }
            }

            for batch in batches(plan, &pending) {
                if ctx.is_cancelled() {
                    return Err(cancelled(run));
                }
                for &idx in &batch {
                    progress.on_step_start(plan.entries()[idx].id());
                }

                let outcomes: Vec<(usize, ApplyOutcome)> = match &pool {
                    Some(pool) if batch.len() > 1 => pool.install(|| {
                        batch
                            .par_iter()
                            .map(|&idx| (idx, self.apply_entry(&plan.entries()[idx], &ctx)))
                            .collect()
                    }),
                    _ => batch
                        .iter()
                        .map(|&idx| (idx, self.apply_entry(&plan.entries()[idx], &ctx)))
                        .collect(),
                };

                for (idx, outcome) in outcomes {
                    let id = plan.entries()[idx].id().clone();
                    let result = match outcome {
                        ApplyOutcome::Applied(undo) => {
                            log::info!("Applied {id}");
                            run.applied.push((idx, undo));
                            StepResult::new(id, ResultStatus::Applied)
                        }
                        ApplyOutcome::Failed(error) => {
                            log::warn!("Failed {id}: {error}");
                            StepResult::new(id, ResultStatus::Failed).with_error(error)
                        }
                    };
                    run.record(idx, result, progress);
                }
            }
        }

        let rollback = if self.rollback_on_failure && !ctx.dry_run && run.has_failures() {
            roll_back(&mut run, progress)
        } else {
            Vec::new()
        };
        Ok(run.into_report(rollback))
    }

    /// Result for entries that must not be applied; `None` means apply it
    fn settle_without_apply(
        &self,
        run: &Run<'_>,
        entry: &PlanEntry,
        ctx: &RunContext,
    ) -> Option<StepResult> {
        let id = entry.id().clone();

        for dep in entry.step.depends_on() {
            if let Some(status) = run.status_of(dep)
                && !status.is_success()
            {
                log::debug!("Skipping {id}: dependency {dep} is {status}");
                return Some(
                    StepResult::new(id, ResultStatus::Skipped)
                        .with_error(format!("dependency {dep} {status}")),
                );
            }
        }

        let result = match entry.status {
            StepStatus::Satisfied => StepResult::new(id, ResultStatus::Satisfied),
            StepStatus::Skipped => StepResult::new(id, ResultStatus::Skipped),
            StepStatus::Failed if ctx.dry_run => StepResult::new(id, ResultStatus::Skipped)
                .with_error(entry.error.clone().unwrap_or_else(|| "check failed".into())),
            StepStatus::Failed => StepResult::new(id, ResultStatus::Failed),
            StepStatus::Unknown => StepResult::new(id, ResultStatus::Unknown)
                .with_error(entry.error.clone().unwrap_or_else(|| "state unknown".into())),
            StepStatus::NeedsApply if ctx.dry_run => StepResult::new(id, ResultStatus::DryRun),
            StepStatus::NeedsApply => return None,
        };
        Some(match &entry.error {
            Some(error) if result.error.is_none() => result.with_error(error.clone()),
            _ => result,
        })
    }

    fn apply_entry(&self, entry: &PlanEntry, ctx: &RunContext) -> ApplyOutcome {
        let undo = match (self.rollback_on_failure, entry.step.as_revertible()) {
            (true, Some(revertible)) => match revertible.capture(ctx) {
                Ok(undo) => Some(undo),
                Err(e) => return ApplyOutcome::Failed(format!("snapshot failed: {e:#}")),
            },
            _ => None,
        };

        match entry.step.apply(ctx) {
            Ok(()) => ApplyOutcome::Applied(undo),
            Err(e) => ApplyOutcome::Failed(format!("{e:#}")),
        }
    }
}

fn cancelled(run: Run<'_>) -> ExecuteError {
    log::warn!("Execution cancelled; no further steps will be started");
    ExecuteError::Cancelled(Box::new(run.into_report(Vec::new())))
}

/// Unwind applied steps in reverse application order
fn roll_back(run: &mut Run<'_>, progress: &mut dyn ProgressCallback) -> Vec<RollbackRecord> {
    let mut records = Vec::with_capacity(run.applied.len());
    while let Some((idx, undo)) = run.applied.pop() {
        let id = run.plan.entries()[idx].id().clone();
        let outcome = match undo {
            None => RollbackOutcome::NotRevertible,
            Some(undo) => match undo.undo() {
                Ok(()) => {
                    log::warn!("Rolled back {id} ({})", undo.describe());
                    RollbackOutcome::RolledBack
                }
                Err(e) => {
                    log::warn!("Rollback of {id} failed: {e:#}");
                    RollbackOutcome::Error(format!("{e:#}"))
                }
            },
        };
        let record = RollbackRecord { id, outcome };
        progress.on_rollback(&record);
        records.push(record);
    }
    records
}

/// Entry indices grouped by dependency level
fn waves(plan: &Plan) -> Vec<Vec<usize>> {
    depth_waves(plan.len(), |idx| {
        plan.entries()[idx]
            .step
            .depends_on()
            .iter()
            .filter_map(|dep| plan.position(dep))
            .collect::<Vec<_>>()
    })
}

/// Split entries so that no batch holds two steps with the same resource key
fn batches(plan: &Plan, pending: &[usize]) -> Vec<Vec<usize>> {
    let mut batches: Vec<(HashSet<String>, Vec<usize>)> = Vec::new();
    for &idx in pending {
        let key = plan.entries()[idx].step.resource_key();
        match batches.iter_mut().find(|(keys, _)| !keys.contains(&key)) {
            Some((keys, batch)) => {
                keys.insert(key);
                batch.push(idx);
            }
            None => batches.push((HashSet::from([key]), vec![idx])),
        }
    }
    batches.into_iter().map(|(_, batch)| batch).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelToken, NoProgress};
    use crate::graph::StepGraphBuilder;
    use crate::planner::Planner;
    use crate::testing::{Journal, TestStep, id};

    fn plan(steps: Vec<TestStep>) -> Plan {
        plan_with(steps, &RunContext::new("."))
    }

    fn plan_with(steps: Vec<TestStep>, ctx: &RunContext) -> Plan {
        let mut builder = StepGraphBuilder::new();
        for step in steps {
            builder.add(step.boxed()).unwrap();
        }
        let graph = builder.build().unwrap();
        Planner::new().plan(&graph, ctx).unwrap()
    }

    fn status(report: &ExecutionReport, step: &str) -> ResultStatus {
        report.get(&id(step)).unwrap().status
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<String>,
        completed: Vec<String>,
        rolled_back: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_step_start(&mut self, id: &StepId) {
            self.started.push(id.to_string());
        }

        fn on_step_complete(&mut self, result: &StepResult) {
            self.completed.push(result.id.to_string());
        }

        fn on_rollback(&mut self, record: &RollbackRecord) {
            self.rolled_back.push(record.id.to_string());
        }
    }

    #[test]
    fn test_empty_plan() {
        let report = Executor::new()
            .execute(&Plan::default(), &RunContext::new("."), &mut NoProgress)
            .unwrap();
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_applies_in_plan_order() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:c", &["a:x:b"]).journal(&journal),
            TestStep::new("a:x:b", &["a:x:a"]).journal(&journal),
            TestStep::new("a:x:a", &[]).journal(&journal),
        ]);
        let report = Executor::new()
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert_eq!(journal.with_prefix("apply:"), vec!["a:x:a", "a:x:b", "a:x:c"]);
        assert_eq!(report.count(ResultStatus::Applied), 3);
    }

    #[test]
    fn test_satisfied_steps_are_not_applied() {
        let journal = Journal::default();
        let p = plan(vec![TestStep::new("a:x:1", &[]).satisfied().journal(&journal)]);
        let report = Executor::new()
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();
        assert_eq!(status(&report, "a:x:1"), ResultStatus::Satisfied);
        assert!(journal.with_prefix("apply:").is_empty());
    }

    #[test]
    fn test_dry_run_never_applies() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).journal(&journal),
            TestStep::new("a:x:2", &["a:x:1"]).journal(&journal),
            TestStep::new("a:x:3", &[]).satisfied().journal(&journal),
        ]);
        let report = Executor::new()
            .with_dry_run(true)
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert!(journal.with_prefix("apply:").is_empty());
        assert_eq!(status(&report, "a:x:1"), ResultStatus::DryRun);
        assert_eq!(status(&report, "a:x:2"), ResultStatus::DryRun);
        assert_eq!(status(&report, "a:x:3"), ResultStatus::Satisfied);
    }

    #[test]
    fn test_dry_run_reports_failed_check_as_skipped() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).check_failed().journal(&journal),
            TestStep::new("a:x:2", &[]).journal(&journal),
        ]);
        let report = Executor::new()
            .with_dry_run(true)
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert_eq!(status(&report, "a:x:1"), ResultStatus::Skipped);
        assert_eq!(status(&report, "a:x:2"), ResultStatus::DryRun);
        assert!(!report.has_failures());
        assert!(journal.with_prefix("apply:").is_empty());
    }

    #[test]
    fn test_dry_run_from_context() {
        let journal = Journal::default();
        let ctx = RunContext::new(".").with_dry_run(true);
        let p = plan_with(vec![TestStep::new("a:x:1", &[]).journal(&journal)], &ctx);
        let report = Executor::new().execute(&p, &ctx, &mut NoProgress).unwrap();
        assert_eq!(status(&report, "a:x:1"), ResultStatus::DryRun);
        assert!(journal.with_prefix("apply:").is_empty());
    }

    #[test]
    fn test_failure_skips_dependents_but_not_independent_branches() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:base", &[]).failing().journal(&journal),
            TestStep::new("a:x:child", &["a:x:base"]).journal(&journal),
            TestStep::new("a:x:grandchild", &["a:x:child"]).journal(&journal),
            TestStep::new("b:x:other", &[]).journal(&journal),
        ]);
        let report = Executor::new()
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert_eq!(status(&report, "a:x:base"), ResultStatus::Failed);
        assert_eq!(status(&report, "a:x:child"), ResultStatus::Skipped);
        assert_eq!(status(&report, "a:x:grandchild"), ResultStatus::Skipped);
        assert_eq!(status(&report, "b:x:other"), ResultStatus::Applied);
        assert!(
            report
                .get(&id("a:x:child"))
                .unwrap()
                .error
                .as_deref()
                .unwrap()
                .contains("a:x:base")
        );
        assert_eq!(journal.with_prefix("apply:"), vec!["a:x:base", "b:x:other"]);
        assert!(report.has_failures());
        assert!(!report.was_rolled_back());
    }

    #[test]
    fn test_unknown_blocks_dependents() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).check_error("inspection failed").journal(&journal),
            TestStep::new("a:x:2", &["a:x:1"]).journal(&journal),
        ]);
        let report = Executor::new()
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert_eq!(status(&report, "a:x:1"), ResultStatus::Unknown);
        assert_eq!(status(&report, "a:x:2"), ResultStatus::Skipped);
        assert!(journal.with_prefix("apply:").is_empty());
    }

    #[test]
    fn test_rollback_unwinds_chain_in_reverse() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).revertible().journal(&journal),
            TestStep::new("a:x:2", &["a:x:1"]).revertible().journal(&journal),
            TestStep::new("a:x:3", &["a:x:2"])
                .revertible()
                .failing()
                .journal(&journal),
        ]);
        let mut recorder = Recorder::default();
        let report = Executor::new()
            .with_rollback_on_failure(true)
            .execute(&p, &RunContext::new("."), &mut recorder)
            .unwrap();

        assert_eq!(status(&report, "a:x:3"), ResultStatus::Failed);
        assert_eq!(journal.with_prefix("undo:"), vec!["a:x:2", "a:x:1"]);
        assert_eq!(
            report.rollback,
            vec![
                RollbackRecord {
                    id: id("a:x:2"),
                    outcome: RollbackOutcome::RolledBack
                },
                RollbackRecord {
                    id: id("a:x:1"),
                    outcome: RollbackOutcome::RolledBack
                },
            ]
        );
        assert_eq!(recorder.rolled_back, vec!["a:x:2", "a:x:1"]);
    }

    #[test]
    fn test_without_rollback_effects_persist() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).revertible().journal(&journal),
            TestStep::new("a:x:2", &["a:x:1"]).failing().journal(&journal),
        ]);
        let report = Executor::new()
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        assert!(journal.with_prefix("capture:").is_empty());
        assert!(journal.with_prefix("undo:").is_empty());
        assert!(report.rollback.is_empty());
    }

    #[test]
    fn test_non_revertible_steps_are_recorded() {
        let p = plan(vec![
            TestStep::new("a:x:1", &[]),
            TestStep::new("a:x:2", &["a:x:1"]).failing(),
        ]);
        let report = Executor::new()
            .with_rollback_on_failure(true)
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();
        assert_eq!(
            report.rollback,
            vec![RollbackRecord {
                id: id("a:x:1"),
                outcome: RollbackOutcome::NotRevertible
            }]
        );
    }

    #[test]
    fn test_no_rollback_without_failures() {
        let journal = Journal::default();
        let p = plan(vec![TestStep::new("a:x:1", &[]).revertible().journal(&journal)]);
        let report = Executor::new()
            .with_rollback_on_failure(true)
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();
        assert_eq!(journal.with_prefix("capture:"), vec!["a:x:1"]);
        assert!(journal.with_prefix("undo:").is_empty());
        assert!(report.rollback.is_empty());
    }

    #[test]
    fn test_cancellation_returns_partial_report() {
        let token = CancelToken::new();
        let journal = Journal::default();
        let ctx = RunContext::new(".").with_cancel_token(token.clone());
        let p = plan_with(
            vec![
                TestStep::new("a:x:1", &[]).revertible().journal(&journal),
                TestStep::new("a:x:2", &["a:x:1"])
                    .cancel_on_apply(&token)
                    .journal(&journal),
                TestStep::new("a:x:3", &["a:x:2"]).journal(&journal),
            ],
            &ctx,
        );

        let err = Executor::new()
            .with_rollback_on_failure(true)
            .execute(&p, &ctx, &mut NoProgress)
            .unwrap_err();

        let ExecuteError::Cancelled(report) = err else {
            panic!("expected cancellation");
        };
        assert_eq!(report.results.len(), 2);
        assert!(report.get(&id("a:x:3")).is_none());
        assert!(report.rollback.is_empty());
        assert_eq!(journal.with_prefix("apply:"), vec!["a:x:1", "a:x:2"]);
        assert!(journal.with_prefix("undo:").is_empty());
    }

    #[test]
    fn test_progress_callbacks() {
        let p = plan(vec![
            TestStep::new("a:x:1", &[]),
            TestStep::new("a:x:2", &[]).satisfied(),
        ]);
        let mut recorder = Recorder::default();
        Executor::new()
            .execute(&p, &RunContext::new("."), &mut recorder)
            .unwrap();
        assert_eq!(recorder.started, vec!["a:x:1"]);
        assert_eq!(recorder.completed, vec!["a:x:1", "a:x:2"]);
    }

    #[test]
    fn test_parallel_respects_dependencies() {
        let journal = Journal::default();
        let p = plan(vec![
            TestStep::new("a:x:root", &[]).journal(&journal),
            TestStep::new("a:x:left", &["a:x:root"]).journal(&journal),
            TestStep::new("a:x:right", &["a:x:root"]).journal(&journal),
            TestStep::new("a:x:join", &["a:x:left", "a:x:right"]).journal(&journal),
        ]);
        let report = Executor::new()
            .with_jobs(4)
            .execute(&p, &RunContext::new("."), &mut NoProgress)
            .unwrap();

        let applied = journal.with_prefix("apply:");
        assert_eq!(applied.len(), 4);
        assert_eq!(applied[0], "a:x:root");
        assert_eq!(applied[3], "a:x:join");
        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a:x:root", "a:x:left", "a:x:right", "a:x:join"]);
    }

    #[test]
    fn test_shared_resource_keys_split_batches() {
        let p = plan(vec![
            TestStep::new("a:x:1", &[]).resource_key("/etc/hosts"),
            TestStep::new("a:x:2", &[]).resource_key("/etc/hosts"),
            TestStep::new("a:x:3", &[]),
        ]);
        let batches = batches(&p, &[0, 1, 2]);
        assert_eq!(batches, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_waves_by_depth() {
        let p = plan(vec![
            TestStep::new("a:x:1", &[]),
            TestStep::new("a:x:2", &["a:x:1"]),
            TestStep::new("a:x:3", &[]),
        ]);
        assert_eq!(waves(&p), vec![vec![0, 2], vec![1]]);
    }
}
