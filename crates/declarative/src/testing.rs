//! Hand-written step doubles shared by the crate's unit tests

use crate::context::{CancelToken, ExplainContext, RunContext};
use crate::diff::Diff;
use crate::id::StepId;
use crate::step::{Revertible, Step, Undo};
use crate::types::{Explanation, StepStatus};
use anyhow::{Result, bail};
use std::sync::{Arc, Mutex};

/// Shared record of calls made on test steps, in call order
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events with the given prefix, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

pub fn id(s: &str) -> StepId {
    StepId::new(s).unwrap()
}

#[derive(Debug, Clone)]
pub struct TestStep {
    id: StepId,
    deps: Vec<StepId>,
    status: StepStatus,
    check_error: Option<String>,
    plan_error: Option<String>,
    fail_apply: bool,
    revertible: bool,
    resource_key: Option<String>,
    cancel_on_apply: Option<CancelToken>,
    journal: Journal,
}

impl TestStep {
    pub fn new(step_id: &str, deps: &[&str]) -> Self {
        Self {
            id: id(step_id),
            deps: deps.iter().map(|d| id(d)).collect(),
            status: StepStatus::NeedsApply,
            check_error: None,
            plan_error: None,
            fail_apply: false,
            revertible: false,
            resource_key: None,
            cancel_on_apply: None,
            journal: Journal::default(),
        }
    }

    pub fn satisfied(mut self) -> Self {
        self.status = StepStatus::Satisfied;
        self
    }

    /// Check reports the step as already failed
    pub fn check_failed(mut self) -> Self {
        self.status = StepStatus::Failed;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn check_error(mut self, msg: &str) -> Self {
        self.check_error = Some(msg.to_string());
        self
    }

    pub fn plan_error(mut self, msg: &str) -> Self {
        self.plan_error = Some(msg.to_string());
        self
    }

    pub fn revertible(mut self) -> Self {
        self.revertible = true;
        self
    }

    pub fn resource_key(mut self, key: &str) -> Self {
        self.resource_key = Some(key.to_string());
        self
    }

    pub fn cancel_on_apply(mut self, token: &CancelToken) -> Self {
        self.cancel_on_apply = Some(token.clone());
        self
    }

    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    pub fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }
}

impl Step for TestStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.deps
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        self.journal.record(format!("check:{}", self.id));
        if let Some(msg) = &self.check_error {
            bail!("{msg}");
        }
        Ok(self.status)
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        if let Some(msg) = &self.plan_error {
            bail!("{msg}");
        }
        Ok(Diff::add("test", self.id.qualifier(), None))
    }

    fn apply(&self, _ctx: &RunContext) -> Result<()> {
        self.journal.record(format!("apply:{}", self.id));
        if let Some(token) = &self.cancel_on_apply {
            token.cancel();
        }
        if self.fail_apply {
            bail!("boom: {}", self.id);
        }
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation::new(format!("test step {}", self.id))
    }

    fn resource_key(&self) -> String {
        self.resource_key
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    fn as_revertible(&self) -> Option<&dyn Revertible> {
        if self.revertible { Some(self) } else { None }
    }
}

impl Revertible for TestStep {
    fn capture(&self, _ctx: &RunContext) -> Result<Box<dyn Undo>> {
        self.journal.record(format!("capture:{}", self.id));
        Ok(Box::new(TestUndo {
            id: self.id.clone(),
            journal: self.journal.clone(),
        }))
    }
}

#[derive(Debug)]
struct TestUndo {
    id: StepId,
    journal: Journal,
}

impl Undo for TestUndo {
    fn undo(&self) -> Result<()> {
        self.journal.record(format!("undo:{}", self.id));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("undo {}", self.id)
    }
}
