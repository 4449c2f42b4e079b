//! Allow/deny policy over step IDs

use crate::error::{Error, Result};
use crate::pattern::Pattern;
use declarative::{StepGraph, StepId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: Action,
    pub pattern: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Rule {
    pub fn allow(pattern: Pattern) -> Self {
        Self {
            action: Action::Allow,
            pattern,
            reason: None,
        }
    }

    pub fn deny(pattern: Pattern) -> Self {
        Self {
            action: Action::Deny,
            pattern,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Allow/deny rules with a default action
///
/// An ID violates the policy if it matches a deny rule and no allow rule,
/// or if the default is deny and it matches no allow rule. Allow rules
/// always win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub default: Action,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub id: StepId,
    /// Deny rule that matched; `None` when denied by default
    pub pattern: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyReport {
    pub allowed: Vec<StepId>,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl Policy {
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_default(mut self, default: Action) -> Self {
        self.default = default;
        self
    }

    /// Concatenate rules; deny by default if any source does
    pub fn merge<'a>(policies: impl IntoIterator<Item = &'a Policy>) -> Self {
        let mut merged = Self::default();
        for policy in policies {
            if policy.default == Action::Deny {
                merged.default = Action::Deny;
            }
            merged.rules.extend(policy.rules.iter().cloned());
        }
        merged
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_yaml(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "Loaded policy {} ({} rule(s))",
            path.display(),
            policy.rules.len()
        );
        Ok(policy)
    }

    /// Check a single ID; `None` means allowed
    pub fn check(&self, id: &StepId) -> Option<PolicyViolation> {
        if self.first_match(Action::Allow, id).is_some() {
            return None;
        }

        if let Some(rule) = self.first_match(Action::Deny, id) {
            return Some(PolicyViolation {
                id: id.clone(),
                pattern: Some(rule.pattern.to_string()),
                reason: rule
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("denied by rule '{}'", rule.pattern)),
            });
        }

        (self.default == Action::Deny).then(|| PolicyViolation {
            id: id.clone(),
            pattern: None,
            reason: "not allowed by any rule (default is deny)".to_string(),
        })
    }

    fn first_match(&self, action: Action, id: &StepId) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|r| r.action == action && r.pattern.matches(id.as_str()))
    }

    pub fn evaluate<'a>(&self, ids: impl IntoIterator<Item = &'a StepId>) -> PolicyReport {
        let mut report = PolicyReport::default();
        for id in ids {
            match self.check(id) {
                Some(violation) => report.violations.push(violation),
                None => report.allowed.push(id.clone()),
            }
        }
        report
    }

    pub fn evaluate_graph(&self, graph: &StepGraph) -> PolicyReport {
        self.evaluate(graph.order())
    }
}
