//! Refreshing a lockfile from a plan or from the report of applying it

use crate::types::{Lockfile, Upsert};
use chrono::{DateTime, Utc};
use declarative::{ExecutionReport, Plan, ResultStatus, RunContext, StepStatus};
use std::collections::BTreeSet;

/// Keys changed by a lock update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockUpdate {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl LockUpdate {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

impl Lockfile {
    /// Record the versions of every lockable step in `plan`
    pub fn update_from_plan(&mut self, plan: &Plan, ctx: &RunContext) -> LockUpdate {
        self.update_from_plan_at(plan, ctx, Utc::now())
    }

    /// [`update_from_plan`](Self::update_from_plan) with an explicit timestamp
    ///
    /// Entries that are failed, skipped or unknown are left alone. Afterwards,
    /// lock entries of providers seen in the plan whose key no longer appears
    /// in it are removed; other providers' entries are untouched.
    pub fn update_from_plan_at(
        &mut self,
        plan: &Plan,
        ctx: &RunContext,
        now: DateTime<Utc>,
    ) -> LockUpdate {
        self.refresh(plan, None, ctx, now)
    }

    /// Record the versions of the lockable steps that an apply run actually
    /// applied or found satisfied
    pub fn update_from_run(
        &mut self,
        plan: &Plan,
        report: &ExecutionReport,
        ctx: &RunContext,
    ) -> LockUpdate {
        self.update_from_run_at(plan, report, ctx, Utc::now())
    }

    /// [`update_from_run`](Self::update_from_run) with an explicit timestamp
    ///
    /// A step is locked only when its result is applied, satisfied or
    /// dry-run. Steps skipped at execution time, or missing from the report,
    /// keep their existing entry.
    pub fn update_from_run_at(
        &mut self,
        plan: &Plan,
        report: &ExecutionReport,
        ctx: &RunContext,
        now: DateTime<Utc>,
    ) -> LockUpdate {
        self.refresh(plan, Some(report), ctx, now)
    }

    fn refresh(
        &mut self,
        plan: &Plan,
        report: Option<&ExecutionReport>,
        ctx: &RunContext,
        now: DateTime<Utc>,
    ) -> LockUpdate {
        let mut update = LockUpdate::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();
        let mut present: BTreeSet<String> = BTreeSet::new();

        for entry in plan.entries() {
            let Some(info) = entry.step.as_lockable().and_then(|l| l.lock_info()) else {
                continue;
            };
            let key = info.key();
            touched.insert(info.provider.clone());
            present.insert(key.clone());

            if matches!(
                entry.status,
                StepStatus::Failed | StepStatus::Skipped | StepStatus::Unknown
            ) {
                log::debug!("Not locking {key}: step is {}", entry.status);
                continue;
            }

            if let Some(report) = report {
                match report.get(entry.id()).map(|r| r.status) {
                    Some(ResultStatus::Applied | ResultStatus::Satisfied | ResultStatus::DryRun) => {}
                    Some(status) => {
                        log::debug!("Not locking {key}: step was {status}");
                        continue;
                    }
                    None => {
                        log::debug!("Not locking {key}: step did not run");
                        continue;
                    }
                }
            }

            let version = match info.version {
                Some(v) => Some(v),
                None => match entry.step.as_versioned() {
                    Some(versioned) => match versioned.installed_version(ctx) {
                        Ok(v) => v,
                        Err(e) => {
                            log::debug!("Could not read installed version of {key}: {e:#}");
                            None
                        }
                    },
                    None => None,
                },
            };
            let Some(version) = version.filter(|v| !v.is_empty()) else {
                log::debug!("Not locking {key}: no version known");
                continue;
            };

            match self.upsert(&info.provider, &info.name, &version, now) {
                Upsert::Added => update.added.push(key),
                Upsert::Updated => update.updated.push(key),
                Upsert::Unchanged => {}
            }
        }

        let stale: Vec<String> = self
            .packages
            .keys()
            .filter(|key| {
                key.split_once(':')
                    .is_some_and(|(provider, _)| touched.contains(provider))
                    && !present.contains(*key)
            })
            .cloned()
            .collect();
        for key in stale {
            self.packages.remove(&key);
            update.removed.push(key);
        }

        log::debug!(
            "Lock update: {} added, {} updated, {} removed",
            update.added.len(),
            update.updated.len(),
            update.removed.len()
        );
        update
    }
}
