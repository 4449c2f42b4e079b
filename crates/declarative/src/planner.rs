//! Planner - checks every step and records what would change
//!
//! Planning never modifies the system: only `check` and `plan` are called.
//! A failing check is recorded as [`StepStatus::Unknown`] on its entry
//! rather than aborting the whole plan.

use crate::context::RunContext;
use crate::diff::{Diff, DiffSummary};
use crate::error::{Error, Result};
use crate::graph::StepGraph;
use crate::id::StepId;
use crate::step::SharedStep;
use crate::types::StepStatus;
use std::collections::HashMap;
use std::sync::Arc;

/// One step with its planned status
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub step: SharedStep,
    pub status: StepStatus,
    pub diff: Diff,
    /// Why the status is `Unknown`
    pub error: Option<String>,
}

impl PlanEntry {
    pub fn id(&self) -> &StepId {
        self.step.id()
    }
}

/// Counts of plan entries per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub satisfied: usize,
    pub needs_apply: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unknown: usize,
}

impl PlanSummary {
    pub fn total(&self) -> usize {
        self.satisfied + self.needs_apply + self.skipped + self.failed + self.unknown
    }

    fn count(&mut self, status: StepStatus) {
        match status {
            StepStatus::Satisfied => self.satisfied += 1,
            StepStatus::NeedsApply => self.needs_apply += 1,
            StepStatus::Skipped => self.skipped += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Unknown => self.unknown += 1,
        }
    }
}

/// Ordered, immutable result of planning a graph
#[derive(Debug, Clone, Default)]
pub struct Plan {
    entries: Vec<PlanEntry>,
    positions: HashMap<StepId, usize>,
}

impl Plan {
    /// Build a plan from entries already in topological order
    pub fn from_entries(entries: Vec<PlanEntry>) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id().clone(), i))
            .collect();
        Self { entries, positions }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &StepId) -> Option<&PlanEntry> {
        self.position(id).map(|i| &self.entries[i])
    }

    /// Index of a step's entry
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for entry in &self.entries {
            summary.count(entry.status);
        }
        summary
    }

    /// True iff at least one entry needs applying
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.status == StepStatus::NeedsApply)
    }

    /// Diffs of entries that need applying
    pub fn diffs(&self) -> impl Iterator<Item = &Diff> {
        self.entries
            .iter()
            .filter(|e| e.status == StepStatus::NeedsApply)
            .map(|e| &e.diff)
    }

    pub fn diff_summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.diffs())
    }

    pub fn unknown(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == StepStatus::Unknown)
    }

    /// Treat undetermined state as blocking
    pub fn ensure_known(&self) -> Result<()> {
        let ids: Vec<StepId> = self.unknown().map(|e| e.id().clone()).collect();
        if ids.is_empty() {
            Ok(())
        } else {
            Err(Error::UnknownState { ids })
        }
    }
}

/// Builds plans by probing steps in topological order
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, graph: &StepGraph, ctx: &RunContext) -> Result<Plan> {
        let mut entries = Vec::with_capacity(graph.len());

        for step in graph.steps() {
            if ctx.is_cancelled() {
                log::debug!("Planning cancelled after {} step(s)", entries.len());
                return Err(Error::Cancelled);
            }
            entries.push(plan_step(step, ctx));
        }

        let plan = Plan::from_entries(entries);
        let summary = plan.summary();
        log::debug!(
            "Planned {} step(s): {} to apply, {} satisfied, {} unknown",
            summary.total(),
            summary.needs_apply,
            summary.satisfied,
            summary.unknown
        );
        Ok(plan)
    }
}

fn plan_step(step: &SharedStep, ctx: &RunContext) -> PlanEntry {
    let entry = |status, diff, error| PlanEntry {
        step: Arc::clone(step),
        status,
        diff,
        error,
    };

    let status = match step.check(ctx) {
        Ok(status) => status,
        Err(e) => {
            log::debug!("Check failed for {}: {e:#}", step.id());
            return entry(StepStatus::Unknown, Diff::none(), Some(format!("{e:#}")));
        }
    };

    if status != StepStatus::NeedsApply {
        return entry(status, Diff::none(), None);
    }

    match step.plan(ctx) {
        Ok(diff) => entry(status, diff, None),
        Err(e) => {
            log::debug!("Plan failed for {}: {e:#}", step.id());
            entry(StepStatus::Unknown, Diff::none(), Some(format!("{e:#}")))
        }
    }
}
