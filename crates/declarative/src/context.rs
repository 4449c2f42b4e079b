//! Run context, cancellation and progress callbacks
//!
//! These types let steps and the engine be driven without depending on a
//! particular UI or signal-handling implementation.

use crate::executor::RollbackRecord;
use crate::id::StepId;
use crate::types::StepResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a signal handler and a run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next step boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to `Check`, `Plan` and `Apply`
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Whether this run must not change the system
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    config_root: PathBuf,
    cancel: CancelToken,
}

impl RunContext {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            dry_run: false,
            verbose: false,
            config_root: config_root.into(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Directory relative paths in the configuration are resolved against
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Context passed to `Explain`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainContext {
    /// Include tradeoffs and long-form detail
    pub verbose: bool,
}

/// Progress callback for execution
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called before a step is applied (not called for skipped entries)
    fn on_step_start(&mut self, id: &StepId);

    /// Called once per plan entry with its final result
    fn on_step_complete(&mut self, result: &StepResult);

    /// Called for each step considered during rollback
    fn on_rollback(&mut self, _record: &RollbackRecord) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step_start(&mut self, _id: &StepId) {}
    fn on_step_complete(&mut self, _result: &StepResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let ctx = RunContext::new("/tmp").with_cancel_token(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.clone().is_cancelled());
    }

    #[test]
    fn test_run_context_defaults() {
        let ctx = RunContext::new("/etc/keel");
        assert!(!ctx.dry_run);
        assert_eq!(ctx.config_root(), Path::new("/etc/keel"));
    }
}
