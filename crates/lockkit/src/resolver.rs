//! Lockfile-backed version resolution
//!
//! | Mode   | Entry present                     | Entry absent        |
//! |--------|-----------------------------------|---------------------|
//! | intent | latest (lockfile ignored)         | latest              |
//! | locked | locked version, drift reported    | latest, `updated`   |
//! | frozen | locked version, drift reported    | failure             |

use crate::error::{Error, Result};
use crate::types::{Lockfile, Mode, ResolutionRecord, lock_key};
use declarative::{Resolution, Source, VersionResolver};
use std::sync::{Mutex, PoisonError};

/// Resolve one package against a lockfile snapshot
pub fn resolve(
    mode: Mode,
    lockfile: &Lockfile,
    provider: &str,
    name: &str,
    latest: Option<&str>,
) -> Resolution {
    if mode == Mode::Intent {
        return Resolution::latest(latest);
    }

    let Some(locked) = lockfile.locked_version(provider, name) else {
        return match mode {
            Mode::Frozen => Resolution::failure(
                latest,
                format!(
                    "{} is not in the lockfile; frozen mode requires every package to be locked",
                    lock_key(provider, name)
                ),
            ),
            _ => Resolution {
                updated: true,
                ..Resolution::latest(latest)
            },
        };
    };

    let drifted = latest.is_some_and(|l| l != locked);
    if drifted {
        log::warn!(
            "{} is locked at {locked} but {} is available",
            lock_key(provider, name),
            latest.unwrap_or_default()
        );
    }

    Resolution {
        version: Some(locked.to_string()),
        source: if mode == Mode::Frozen {
            Source::Pinned
        } else {
            Source::Locked
        },
        locked: true,
        locked_version: Some(locked.to_string()),
        available_version: latest.map(str::to_string),
        drifted,
        ..Resolution::default()
    }
}

/// [`VersionResolver`] that consults a lockfile and records every decision
#[derive(Debug)]
pub struct LockResolver {
    mode: Mode,
    lockfile: Lockfile,
    records: Mutex<Vec<ResolutionRecord>>,
}

impl LockResolver {
    pub fn new(lockfile: Lockfile, mode: Mode) -> Self {
        Self {
            mode,
            lockfile,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn lockfile(&self) -> &Lockfile {
        &self.lockfile
    }

    /// Every resolution made so far, in request order
    pub fn resolutions(&self) -> Vec<ResolutionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failures(&self) -> Vec<ResolutionRecord> {
        self.resolutions()
            .into_iter()
            .filter(|r| r.resolution.failed)
            .collect()
    }

    /// Error out if any resolution could not be honoured
    pub fn ensure_resolved(&self) -> Result<()> {
        let failures: Vec<String> = self
            .failures()
            .iter()
            .map(|r| {
                r.resolution
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} could not be resolved", r.key()))
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Unresolved { failures })
        }
    }
}

impl VersionResolver for LockResolver {
    fn resolve(&self, provider: &str, name: &str, latest: Option<&str>) -> Resolution {
        let resolution = resolve(self.mode, &self.lockfile, provider, name, latest);
        log::debug!(
            "Resolved {} -> {:?} ({})",
            lock_key(provider, name),
            resolution.version,
            resolution.source
        );
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ResolutionRecord {
                provider: provider.to_string(),
                name: name.to_string(),
                resolution: resolution.clone(),
            });
        resolution
    }
}
