//! # Policy
//!
//! Read-only policy evaluation over the step IDs of a compiled graph.
//!
//! - [`Policy`]: allow/deny rules with a default action
//! - [`OrgPolicy`]: required and forbidden steps, advisory or blocking,
//!   with expiring overrides
//!
//! Patterns are globs over the full `provider:kind:qualifier` ID (see
//! [`Pattern`]). Evaluation never changes the graph or plan; callers decide
//! what to do with the reports.

mod error;
mod org;
mod pattern;
mod rules;

pub use error::{Error, Result};
pub use org::{Enforcement, Finding, FindingKind, OrgPolicy, OrgReport, OverriddenFinding, Override};
pub use pattern::Pattern;
pub use rules::{Action, Policy, PolicyReport, PolicyViolation, Rule};
