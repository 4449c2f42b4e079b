//! Step identifiers
//!
//! A [`StepId`] has the form `provider:kind:qualifier`, for example
//! `brew:formula:git` or `file:link:~/.zshrc`. The qualifier may itself
//! contain colons; only the first two separate segments.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validated, immutable identifier of a step
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    /// Parse and validate a step ID
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    /// Build an ID from its three segments
    pub fn from_parts(provider: &str, kind: &str, qualifier: &str) -> Result<Self> {
        Self::new(format!("{provider}:{kind}:{qualifier}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provider segment (`brew` in `brew:formula:git`)
    pub fn provider(&self) -> &str {
        self.segments().0
    }

    /// Kind segment (`formula` in `brew:formula:git`)
    pub fn kind(&self) -> &str {
        self.segments().1
    }

    /// Qualifier segment (`git` in `brew:formula:git`)
    pub fn qualifier(&self) -> &str {
        self.segments().2
    }

    fn segments(&self) -> (&str, &str, &str) {
        // Validated on construction, so both separators exist
        let mut parts = self.0.splitn(3, ':');
        let provider = parts.next().unwrap_or_default();
        let kind = parts.next().unwrap_or_default();
        let qualifier = parts.next().unwrap_or_default();
        (provider, kind, qualifier)
    }
}

fn validate(value: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidStepId {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = value.splitn(3, ':');
    let (Some(provider), Some(kind), Some(qualifier)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("expected provider:kind:qualifier"));
    };

    for (label, segment) in [("provider", provider), ("kind", kind)] {
        if segment.is_empty() {
            return Err(invalid(&format!("{label} is empty")));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(invalid(&format!(
                "{label} may only contain lowercase letters, digits, '-' and '_'"
            )));
        }
    }

    if qualifier.is_empty() {
        return Err(invalid("qualifier is empty"));
    }
    if qualifier.chars().any(char::is_control) {
        return Err(invalid("qualifier contains control characters"));
    }
    if qualifier.trim() != qualifier {
        return Err(invalid("qualifier has leading or trailing whitespace"));
    }

    Ok(())
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StepId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for StepId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<StepId> for String {
    fn from(id: StepId) -> Self {
        id.0
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
