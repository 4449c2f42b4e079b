//! Structured before/after descriptions of a pending change

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of change a diff describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// No change
    #[default]
    None,
    /// Something will be created
    Add,
    /// Something will be changed in place
    Modify,
    /// Something will be removed
    Remove,
}

impl DiffType {
    /// One-character marker used in plan output
    pub fn symbol(&self) -> char {
        match self {
            Self::None => ' ',
            Self::Add => '+',
            Self::Modify => '~',
            Self::Remove => '-',
        }
    }
}

/// A diff between current and desired state of one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub diff_type: DiffType,
    /// Subject kind, e.g. "formula", "symlink"
    pub kind: String,
    /// Subject name, e.g. "git", "~/.zshrc"
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl Diff {
    /// A diff describing no change
    pub fn none() -> Self {
        Self::default()
    }

    pub fn add(kind: impl Into<String>, name: impl Into<String>, new: Option<String>) -> Self {
        Self {
            diff_type: DiffType::Add,
            kind: kind.into(),
            name: name.into(),
            old: None,
            new,
        }
    }

    pub fn modify(
        kind: impl Into<String>,
        name: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
    ) -> Self {
        Self {
            diff_type: DiffType::Modify,
            kind: kind.into(),
            name: name.into(),
            old,
            new,
        }
    }

    pub fn remove(kind: impl Into<String>, name: impl Into<String>, old: Option<String>) -> Self {
        Self {
            diff_type: DiffType::Remove,
            kind: kind.into(),
            name: name.into(),
            old,
            new: None,
        }
    }

    pub fn diff_type(&self) -> DiffType {
        self.diff_type
    }

    pub fn is_empty(&self) -> bool {
        self.diff_type == DiffType::None
    }

    /// Short "old → new" rendering for single-line output
    pub fn transition(&self) -> String {
        match (&self.old, &self.new) {
            (None, None) => String::new(),
            (None, Some(new)) => new.clone(),
            (Some(old), None) => format!("{old} → (none)"),
            (Some(old), Some(new)) => format!("{old} → {new}"),
        }
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub additions: usize,
    pub modifications: usize,
    pub removals: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs, ignoring empty ones
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a Diff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.diff_type {
                DiffType::Add => summary.additions += 1,
                DiffType::Modify => summary.modifications += 1,
                DiffType::Remove => summary.removals += 1,
                DiffType::None => {}
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.removals
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group non-empty diffs by subject kind, in kind order
pub fn group_by_kind<'a>(
    diffs: impl IntoIterator<Item = &'a Diff>,
) -> BTreeMap<&'a str, Vec<&'a Diff>> {
    let mut groups: BTreeMap<&str, Vec<&Diff>> = BTreeMap::new();
    for diff in diffs.into_iter().filter(|d| !d.is_empty()) {
        groups.entry(diff.kind.as_str()).or_default().push(diff);
    }
    groups
}
