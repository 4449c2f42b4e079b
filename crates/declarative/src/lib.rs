//! # Declarative
//!
//! A framework for compiling declarative configuration into a validated
//! step graph, planning it against the current system, and applying it.
//!
//! ## Core Concepts
//!
//! - **Step**: An atomic unit of intent with a stable [`StepId`] and
//!   dependencies on other steps
//! - **Provider**: Translates one configuration section into steps
//! - **StepGraph**: Immutable DAG with a deterministic topological order
//! - **Plan**: Every step inspected with `check` and annotated with a [`Diff`]
//! - **Executor**: Applies a plan with dry-run, rollback and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{CompileOptions, Compiler, Executor, NoProgress, Planner, RawConfig, RunContext};
//!
//! let compiler = Compiler::new().with_provider(MyProvider);
//! let graph = compiler.compile(&RawConfig::new(config), &CompileOptions::default())?;
//!
//! let ctx = RunContext::new("/path/to/config");
//! let plan = Planner::new().plan(&graph, &ctx)?;
//! let report = Executor::new()
//!     .with_rollback_on_failure(true)
//!     .execute(&plan, &ctx, &mut NoProgress)?;
//! ```
//!
//! ## Injection Points
//!
//! - [`Provider`]: produces steps from configuration
//! - [`VersionResolver`]: decides package versions (see the `lockkit` crate)
//! - [`ProgressCallback`]: receives execution progress
//! - [`CancelToken`]: cooperative cancellation between steps
//!
//! The crate has no dependency on a UI, signal handler or lockfile format.

pub mod compiler;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod id;
pub mod lifecycle;
pub mod planner;
pub mod resolution;
pub mod step;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use compiler::{CompileContext, CompileOptions, Compiler, Provider, RawConfig};
pub use context::{CancelToken, ExplainContext, NoProgress, ProgressCallback, RunContext};
pub use diff::{Diff, DiffSummary, DiffType, group_by_kind};
pub use error::{Error, Result};
pub use executor::{ExecuteError, ExecutionReport, Executor, RollbackOutcome, RollbackRecord};
pub use graph::{StepGraph, StepGraphBuilder};
pub use id::StepId;
pub use lifecycle::{FileSnapshot, PriorState};
pub use planner::{Plan, PlanEntry, PlanSummary, Planner};
pub use resolution::{FloatingResolver, Resolution, Source, VersionResolver};
pub use step::{BoxedStep, Lockable, Revertible, SharedStep, Step, Undo, Versioned};
pub use types::{Explanation, LockInfo, ResultStatus, StepResult, StepStatus};
