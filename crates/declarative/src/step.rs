//! Step trait for declarative state management
//!
//! A Step is the atomic unit of configuration intent. Providers translate a
//! configuration section into steps; the planner and executor only ever see
//! the [`Step`] trait, so new providers can be added without touching the
//! engine.

use crate::context::{ExplainContext, RunContext};
use crate::diff::Diff;
use crate::id::StepId;
use crate::types::{Explanation, LockInfo, StepStatus};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Core trait for declarative steps
///
/// Every step provides:
/// - Identity and dependencies (`id`, `depends_on`)
/// - A side-effect-free state inspection (`check`, `plan`)
/// - State convergence (`apply`)
/// - Presentation (`explain`)
///
/// Optional capabilities are discovered through the `as_*` queries rather
/// than through subtyping.
///
/// # Example
///
/// ```ignore
/// use declarative::{Diff, Explanation, ExplainContext, RunContext, Step, StepId, StepStatus};
///
/// #[derive(Debug)]
/// struct Marker { id: StepId, path: std::path::PathBuf }
///
/// impl Step for Marker {
///     fn id(&self) -> &StepId { &self.id }
///     fn depends_on(&self) -> &[StepId] { &[] }
///
///     fn check(&self, _ctx: &RunContext) -> anyhow::Result<StepStatus> {
///         Ok(if self.path.exists() { StepStatus::Satisfied } else { StepStatus::NeedsApply })
///     }
///
///     fn plan(&self, _ctx: &RunContext) -> anyhow::Result<Diff> {
///         Ok(Diff::add("file", self.path.display().to_string(), None))
///     }
///
///     fn apply(&self, _ctx: &RunContext) -> anyhow::Result<()> {
///         std::fs::write(&self.path, "")?;
///         Ok(())
///     }
///
///     fn explain(&self, _ctx: &ExplainContext) -> Explanation {
///         Explanation::new(format!("Create {}", self.path.display()))
///     }
/// }
/// ```
pub trait Step: Send + Sync + fmt::Debug {
    /// Unique, stable identifier
    fn id(&self) -> &StepId;

    /// Steps that must be applied (or already satisfied) before this one
    fn depends_on(&self) -> &[StepId];

    /// Inspect current state
    ///
    /// Must not change the system and must be safe to call repeatedly.
    /// When an external tool is missing, implementations should report
    /// `NeedsApply` rather than fail.
    fn check(&self, ctx: &RunContext) -> Result<StepStatus>;

    /// Describe what `apply` would change
    fn plan(&self, ctx: &RunContext) -> Result<Diff>;

    /// Bring the system into agreement with this step
    fn apply(&self, ctx: &RunContext) -> Result<()>;

    /// Human-readable explanation (no behavioral contract)
    fn explain(&self, ctx: &ExplainContext) -> Explanation;

    /// External resource this step writes to
    ///
    /// Steps with equal keys are never applied concurrently.
    fn resource_key(&self) -> String {
        self.id().to_string()
    }

    /// Lockable capability
    fn as_lockable(&self) -> Option<&dyn Lockable> {
        None
    }

    /// Versioned capability
    fn as_versioned(&self) -> Option<&dyn Versioned> {
        None
    }

    /// Revertible capability (used for rollback)
    fn as_revertible(&self) -> Option<&dyn Revertible> {
        None
    }
}

/// Steps whose outcome can be pinned in a lockfile
pub trait Lockable {
    fn lock_info(&self) -> Option<LockInfo>;
}

/// Steps that can report what is currently installed
pub trait Versioned {
    /// Installed version, or `None` if not installed
    fn installed_version(&self, ctx: &RunContext) -> Result<Option<String>>;
}

/// Steps that can snapshot external state before `apply`
pub trait Revertible {
    /// Capture the undo data needed to restore the current state
    fn capture(&self, ctx: &RunContext) -> Result<Box<dyn Undo>>;
}

/// Compensating action captured before a step was applied
pub trait Undo: Send + fmt::Debug {
    /// Restore the captured state
    fn undo(&self) -> Result<()>;

    /// Short description of what `undo` restores
    fn describe(&self) -> String;
}

/// A boxed step as produced by providers
pub type BoxedStep = Box<dyn Step>;

/// A shared step as stored in graphs and plans
pub type SharedStep = Arc<dyn Step>;
