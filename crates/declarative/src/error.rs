//! Error types for graph construction, planning and execution

use crate::id::StepId;
use thiserror::Error;

/// Errors raised by the declarative engine
///
/// Compile-time variants (`InvalidStepId`, `DuplicateStep`,
/// `MissingDependency`, `Cycle`, `Provider`) are always fatal and are
/// raised before any step is checked or applied.
#[derive(Error, Debug)]
pub enum Error {
    /// A string could not be parsed as a `provider:kind:qualifier` step ID
    #[error("invalid step ID '{value}': {reason}")]
    InvalidStepId { value: String, reason: String },

    /// Two steps were registered under the same ID
    #[error("duplicate step ID: {0}")]
    DuplicateStep(StepId),

    /// A step depends on an ID that no provider produced
    #[error("step {step} depends on {dependency}, which is not in the graph")]
    MissingDependency { step: StepId, dependency: StepId },

    /// The dependency relation contains a cycle
    #[error("cyclic dependency: {}", format_cycle(.ids))]
    Cycle { ids: Vec<StepId> },

    /// A provider failed while compiling its configuration section
    #[error("provider '{provider}' failed to compile")]
    Provider {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// A configuration section could not be decoded
    #[error("invalid '{section}' section: {source}")]
    Section {
        section: String,
        #[source]
        source: serde_json::Error,
    },

    /// Planning finished with entries whose state could not be determined
    #[error("state of {} step(s) could not be determined: {}", .ids.len(), join_ids(.ids))]
    UnknownState { ids: Vec<StepId> },

    /// The run was cancelled between steps
    #[error("operation cancelled")]
    Cancelled,
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(StepId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_cycle(ids: &[StepId]) -> String {
    let mut parts: Vec<&str> = ids.iter().map(StepId::as_str).collect();
    if let Some(first) = ids.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = Error::Cycle {
            ids: vec![id("a:x:1"), id("b:x:2")],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency: a:x:1 -> b:x:2 -> a:x:1"
        );
    }

    #[test]
    fn test_missing_dependency_message() {
        let err = Error::MissingDependency {
            step: id("brew:formula:neovim"),
            dependency: id("brew:tap:homebrew/core"),
        };
        let msg = err.to_string();
        assert!(msg.contains("brew:formula:neovim"));
        assert!(msg.contains("brew:tap:homebrew/core"));
    }

    #[test]
    fn test_unknown_state_lists_ids() {
        let err = Error::UnknownState {
            ids: vec![id("a:x:1"), id("a:x:2")],
        };
        assert_eq!(
            err.to_string(),
            "state of 2 step(s) could not be determined: a:x:1, a:x:2"
        );
    }
}
