//! Version resolution boundary
//!
//! Providers ask a [`VersionResolver`] which version of a package to install.
//! The lockfile-backed resolver lives in `lockkit`; [`FloatingResolver`] is
//! used when no lockfile is in play.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a resolved version came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The caller's latest (or configured) version
    #[default]
    Latest,
    /// A lockfile entry honoured in Locked mode
    Locked,
    /// A lockfile entry enforced unconditionally in Frozen mode
    Pinned,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Latest => "latest",
            Self::Locked => "locked",
            Self::Pinned => "pinned",
        })
    }
}

/// Outcome of resolving one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub version: Option<String>,
    pub source: Source,
    /// A lockfile entry was used
    pub locked: bool,
    pub locked_version: Option<String>,
    /// What the caller reported as latest
    pub available_version: Option<String>,
    /// Locked version differs from the available one
    pub drifted: bool,
    /// No lock entry existed; the lockfile should record this version
    pub updated: bool,
    /// Resolution cannot be honoured (fatal before planning)
    pub failed: bool,
    pub error: Option<String>,
}

impl Resolution {
    /// Floating resolution: whatever the caller considers latest
    pub fn latest(latest: Option<&str>) -> Self {
        Self {
            version: latest.map(str::to_string),
            available_version: latest.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn failure(latest: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            available_version: latest.map(str::to_string),
            failed: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Decides which version a provider should install
pub trait VersionResolver: Send + Sync {
    fn resolve(&self, provider: &str, name: &str, latest: Option<&str>) -> Resolution;
}

/// Resolver that always floats to the caller's version
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatingResolver;

impl VersionResolver for FloatingResolver {
    fn resolve(&self, _provider: &str, _name: &str, latest: Option<&str>) -> Resolution {
        Resolution::latest(latest)
    }
}
