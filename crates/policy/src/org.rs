//! Organizational policy: required and forbidden steps, with expiring overrides

use crate::error::{Error, Result};
use crate::pattern::Pattern;
use chrono::{NaiveDate, Utc};
use declarative::{StepGraph, StepId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// How findings are reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Findings are warnings
    #[default]
    Advisory,
    /// Findings are violations
    Blocking,
}

/// Exemption from a finding, optionally until a date (inclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub pattern: Pattern,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<NaiveDate>,
}

impl Override {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.expires.is_none_or(|expires| today <= expires)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgPolicy {
    pub name: String,
    pub required: Vec<Pattern>,
    pub forbidden: Vec<Pattern>,
    pub enforcement: Enforcement,
    pub overrides: Vec<Override>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    /// A step matches a forbidden pattern
    Forbidden,
    /// No step matches a required pattern
    MissingRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    /// Offending step (forbidden findings only)
    pub id: Option<StepId>,
    pub pattern: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.id) {
            (FindingKind::Forbidden, Some(id)) => {
                write!(f, "{id} is forbidden (matches '{}')", self.pattern)
            }
            _ => write!(f, "required '{}' is not configured", self.pattern),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverriddenFinding {
    pub finding: Finding,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgReport {
    /// Findings under blocking enforcement
    pub violations: Vec<Finding>,
    /// Findings under advisory enforcement
    pub warnings: Vec<Finding>,
    /// Findings suppressed by an active override
    pub overridden: Vec<OverriddenFinding>,
}

impl OrgReport {
    pub fn is_blocking(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.warnings.is_empty()
    }
}

impl OrgPolicy {
    /// Field-wise merge: first non-empty name, de-duplicated union of
    /// required and forbidden, strictest enforcement, all overrides
    pub fn merge<'a>(policies: impl IntoIterator<Item = &'a OrgPolicy>) -> Self {
        let mut merged = Self::default();
        for policy in policies {
            if merged.name.is_empty() {
                merged.name.clone_from(&policy.name);
            }
            for pattern in &policy.required {
                if !merged.required.contains(pattern) {
                    merged.required.push(pattern.clone());
                }
            }
            for pattern in &policy.forbidden {
                if !merged.forbidden.contains(pattern) {
                    merged.forbidden.push(pattern.clone());
                }
            }
            merged.enforcement = merged.enforcement.max(policy.enforcement);
            merged.overrides.extend(policy.overrides.iter().cloned());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.forbidden.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let policy: Self = serde_yaml::from_str(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "Loaded org policy '{}' from {} ({} required, {} forbidden)",
            policy.name,
            path.display(),
            policy.required.len(),
            policy.forbidden.len()
        );
        Ok(policy)
    }

    pub fn evaluate<'a>(&self, ids: impl IntoIterator<Item = &'a StepId>) -> OrgReport {
        self.evaluate_at(ids, Utc::now().date_naive())
    }

    pub fn evaluate_graph(&self, graph: &StepGraph) -> OrgReport {
        self.evaluate(graph.order())
    }

    /// Evaluate with an explicit date for override expiry
    pub fn evaluate_at<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a StepId>,
        today: NaiveDate,
    ) -> OrgReport {
        let ids: Vec<&StepId> = ids.into_iter().collect();
        let active: Vec<&Override> = self
            .overrides
            .iter()
            .filter(|o| {
                let active = o.is_active(today);
                if !active {
                    log::debug!("Ignoring expired override '{}'", o.pattern);
                }
                active
            })
            .collect();

        let mut findings: Vec<(Finding, Option<&Override>)> = Vec::new();

        for id in &ids {
            if let Some(pattern) = self.forbidden.iter().find(|p| p.matches(id.as_str())) {
                let exemption = active
                    .iter()
                    .copied()
                    .find(|o| o.pattern.matches(id.as_str()));
                findings.push((
                    Finding {
                        kind: FindingKind::Forbidden,
                        id: Some((*id).clone()),
                        pattern: pattern.to_string(),
                    },
                    exemption,
                ));
            }
        }

        for pattern in &self.required {
            if ids.iter().any(|id| pattern.matches(id.as_str())) {
                continue;
            }
            let exemption = active
                .iter()
                .copied()
                .find(|o| o.pattern.as_str() == pattern.as_str());
            findings.push((
                Finding {
                    kind: FindingKind::MissingRequired,
                    id: None,
                    pattern: pattern.to_string(),
                },
                exemption,
            ));
        }

        let mut report = OrgReport::default();
        for (finding, exemption) in findings {
            match exemption {
                Some(o) => report.overridden.push(OverriddenFinding {
                    finding,
                    reason: o.reason.clone(),
                }),
                None if self.enforcement == Enforcement::Blocking => {
                    report.violations.push(finding);
                }
                None => report.warnings.push(finding),
            }
        }
        report
    }
}
