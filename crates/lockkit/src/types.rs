//! Lockfile data model

use crate::error::Error;
use chrono::{DateTime, Utc};
use declarative::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Reproducibility contract for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Float to the latest version; the lockfile is informational
    #[default]
    Intent,
    /// Honour locked versions, float for packages not yet locked
    Locked,
    /// Every package must be locked; locked versions are enforced
    Frozen,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Locked => "locked",
            Self::Frozen => "frozen",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intent" => Ok(Self::Intent),
            "locked" => Ok(Self::Locked),
            "frozen" => Ok(Self::Frozen),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// Machine a lockfile was last written on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
}

impl MachineInfo {
    pub fn current() -> Self {
        Self {
            hostname: current_hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

fn current_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Content hash recorded for a locked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub algorithm: String,
    pub hash: String,
}

/// A single locked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    pub version: String,
    pub integrity: Integrity,
    pub locked_at: DateTime<Utc>,
}

/// Result of inserting or refreshing a lock entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
    Unchanged,
}

/// Lockfile aggregate
///
/// Loaded and saved only through a [`Repository`](crate::Repository).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub machine: MachineInfo,
    /// Keyed by `provider:name`
    #[serde(default)]
    pub packages: BTreeMap<String, PackageLock>,
}

/// Lock key for a package
pub fn lock_key(provider: &str, name: &str) -> String {
    format!("{provider}:{name}")
}

impl Lockfile {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            machine: MachineInfo::current(),
            packages: BTreeMap::new(),
        }
    }

    pub fn get(&self, provider: &str, name: &str) -> Option<&PackageLock> {
        self.packages.get(&lock_key(provider, name))
    }

    /// Locked version, ignoring entries with an empty version
    pub fn locked_version(&self, provider: &str, name: &str) -> Option<&str> {
        self.get(provider, name)
            .map(|p| p.version.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Providers that have at least one entry
    pub fn providers(&self) -> BTreeSet<&str> {
        self.packages
            .keys()
            .filter_map(|k| k.split_once(':').map(|(p, _)| p))
            .collect()
    }

    /// Insert or refresh an entry; `locked_at` is kept when nothing changed
    pub fn upsert(
        &mut self,
        provider: &str,
        name: &str,
        version: &str,
        now: DateTime<Utc>,
    ) -> Upsert {
        let integrity = crate::integrity::compute(provider, name, version);
        let key = lock_key(provider, name);

        match self.packages.get_mut(&key) {
            Some(existing) if existing.version == version && existing.integrity == integrity => {
                Upsert::Unchanged
            }
            Some(existing) => {
                existing.version = version.to_string();
                existing.integrity = integrity;
                existing.locked_at = now;
                Upsert::Updated
            }
            None => {
                self.packages.insert(
                    key,
                    PackageLock {
                        version: version.to_string(),
                        integrity,
                        locked_at: now,
                    },
                );
                Upsert::Added
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PackageLock> {
        self.packages.remove(key)
    }

    /// Locked packages whose available version has moved on
    pub fn drift_report<'a>(
        &self,
        records: impl IntoIterator<Item = &'a ResolutionRecord>,
    ) -> Vec<Drift> {
        records
            .into_iter()
            .filter(|r| r.resolution.drifted)
            .filter_map(|r| {
                let locked = self.locked_version(&r.provider, &r.name)?;
                Some(Drift {
                    key: lock_key(&r.provider, &r.name),
                    locked: locked.to_string(),
                    available: r.resolution.available_version.clone(),
                })
            })
            .collect()
    }
}

/// A resolution made during this run, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    pub provider: String,
    pub name: String,
    pub resolution: Resolution,
}

impl ResolutionRecord {
    pub fn key(&self) -> String {
        lock_key(&self.provider, &self.name)
    }
}

/// A locked version that differs from what is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub key: String,
    pub locked: String,
    pub available: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Locked".parse::<Mode>().unwrap(), Mode::Locked);
        assert_eq!("frozen".parse::<Mode>().unwrap(), Mode::Frozen);
        assert!("strict".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::Intent);
    }

    #[test]
    fn test_upsert_keeps_timestamp_when_unchanged() {
        let mut lock = Lockfile::default();
        assert_eq!(lock.upsert("brew", "git", "2.45.0", t(10)), Upsert::Added);
        assert_eq!(lock.upsert("brew", "git", "2.45.0", t(20)), Upsert::Unchanged);
        assert_eq!(lock.get("brew", "git").unwrap().locked_at, t(10));

        assert_eq!(lock.upsert("brew", "git", "2.46.0", t(30)), Upsert::Updated);
        let entry = lock.get("brew", "git").unwrap();
        assert_eq!(entry.locked_at, t(30));
        assert_eq!(entry.version, "2.46.0");
    }

    #[test]
    fn test_providers() {
        let mut lock = Lockfile::default();
        lock.upsert("brew", "git", "1", t(0));
        lock.upsert("brew", "jq", "1", t(0));
        lock.upsert("cargo", "ripgrep", "14", t(0));
        assert_eq!(lock.providers().into_iter().collect::<Vec<_>>(), vec!["brew", "cargo"]);
    }

    #[test]
    fn test_yaml_shape() {
        let mut lock = Lockfile::new(Mode::Locked);
        lock.machine = MachineInfo {
            hostname: "studio".into(),
            os: "macos".into(),
            arch: "aarch64".into(),
        };
        lock.upsert("brew", "neovim", "0.10.0", t(0));

        let yaml = serde_yaml::to_string(&lock).unwrap();
        assert!(yaml.contains("mode: locked"));
        assert!(yaml.contains("brew:neovim:"));
        assert!(yaml.contains("algorithm: blake3"));

        let parsed: Lockfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, lock);
    }

    #[test]
    fn test_drift_report_only_lists_drifted() {
        let mut lock = Lockfile::default();
        lock.upsert("brew", "git", "2.40", t(0));
        lock.upsert("brew", "jq", "1.7", t(0));

        let records = vec![
            ResolutionRecord {
                provider: "brew".into(),
                name: "git".into(),
                resolution: Resolution {
                    drifted: true,
                    available_version: Some("2.45".into()),
                    ..Resolution::default()
                },
            },
            ResolutionRecord {
                provider: "brew".into(),
                name: "jq".into(),
                resolution: Resolution::default(),
            },
        ];

        let drift = lock.drift_report(&records);
        assert_eq!(
            drift,
            vec![Drift {
                key: "brew:git".into(),
                locked: "2.40".into(),
                available: Some("2.45".into()),
            }]
        );
    }
}
