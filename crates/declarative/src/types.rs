//! Core types shared by the planner and executor

use crate::id::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a step as determined by `Check` (and refined by the executor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Current state already matches the desired state
    Satisfied,
    /// The step must be applied to reach the desired state
    NeedsApply,
    /// The step was not attempted
    Skipped,
    /// The step failed
    Failed,
    /// State could not be determined
    Unknown,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::NeedsApply => "needs apply",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether steps depending on one in this state may proceed
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Satisfied | Self::NeedsApply)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome recorded by the executor for one plan entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// `Apply` ran and succeeded
    Applied,
    /// Nothing to do
    Satisfied,
    /// Dry run: the step would have been applied
    DryRun,
    /// Not attempted because a dependency did not complete
    Skipped,
    /// `Apply` returned an error
    Failed,
    /// Not attempted because `Check` could not determine state
    Unknown,
}

impl ResultStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Satisfied => "satisfied",
            Self::DryRun => "dry run",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether dependents of a step with this result may proceed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied | Self::Satisfied | Self::DryRun)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of executing one plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: StepId,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(id: StepId, status: ResultStatus) -> Self {
        Self {
            id,
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Package coordinates reported by lockable steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub provider: String,
    pub name: String,
    /// Version the step installs, if it knows one up front
    pub version: Option<String>,
}

impl LockInfo {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Lockfile key (`provider:name`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider, self.name)
    }
}

/// Human-facing description of a step (presentation only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub doc_links: Vec<String>,
    #[serde(default)]
    pub tradeoffs: Vec<String>,
}

impl Explanation {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.doc_links.push(link.into());
        self
    }

    pub fn with_tradeoff(mut self, tradeoff: impl Into<String>) -> Self {
        self.tradeoffs.push(tradeoff.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unblocks_dependents() {
        assert!(StepStatus::Satisfied.unblocks_dependents());
        assert!(StepStatus::NeedsApply.unblocks_dependents());
        assert!(!StepStatus::Failed.unblocks_dependents());
        assert!(!StepStatus::Skipped.unblocks_dependents());
        assert!(!StepStatus::Unknown.unblocks_dependents());
    }

    #[test]
    fn test_result_status_success() {
        assert!(ResultStatus::Applied.is_success());
        assert!(ResultStatus::DryRun.is_success());
        assert!(!ResultStatus::Failed.is_success());
        assert!(!ResultStatus::Skipped.is_success());
    }

    #[test]
    fn test_lock_info_key() {
        let info = LockInfo::new("brew", "neovim").with_version(Some("0.10.0".into()));
        assert_eq!(info.key(), "brew:neovim");
        assert_eq!(info.version.as_deref(), Some("0.10.0"));
    }
}
