//! Package identities and `brew info --json=v2` documents.

use serde::Deserialize;
use std::fmt;

/// Kind of Homebrew package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// Third-party repository
    Tap,
    /// Command-line formula
    Formula,
    /// Application cask
    Cask,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::Formula => "formula",
            Self::Cask => "cask",
        }
    }

    /// `brew` flag selecting this kind, if any.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Self::Tap => None,
            Self::Formula => Some("--formula"),
            Self::Cask => Some("--cask"),
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package Homebrew can install.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Package {
    /// Short name (`git`, `docker`, `homebrew/cask`)
    pub name: String,
    pub kind: PackageKind,
    /// Tap the package comes from, for formulae and casks outside the core taps
    pub tap: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tap: None,
        }
    }

    pub fn tap(name: impl Into<String>) -> Self {
        Self::new(name, PackageKind::Tap)
    }

    pub fn formula(name: impl Into<String>) -> Self {
        Self::new(name, PackageKind::Formula)
    }

    pub fn cask(name: impl Into<String>) -> Self {
        Self::new(name, PackageKind::Cask)
    }

    #[must_use]
    pub fn with_tap(mut self, tap: impl Into<String>) -> Self {
        self.tap = Some(tap.into());
        self
    }

    /// Name passed to `brew`: `tap/name` when a tap is set and the name is
    /// not already qualified.
    pub fn qualified_name(&self) -> String {
        match &self.tap {
            Some(tap) if self.kind != PackageKind::Tap && !self.name.contains('/') => {
                format!("{tap}/{}", self.name)
            }
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.qualified_name())
    }
}

/// Installation state of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub installed: bool,
    /// Installed version; taps have none
    pub version: Option<String>,
    /// Newest version Homebrew offers
    pub latest: Option<String>,
}

/// Subset of the `brew info --json=v2` document.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct InfoDocument {
    #[serde(default)]
    pub formulae: Vec<FormulaInfo>,
    #[serde(default)]
    pub casks: Vec<CaskInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FormulaInfo {
    #[serde(default)]
    pub versions: FormulaVersions,
    #[serde(default)]
    pub installed: Vec<InstalledKeg>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FormulaVersions {
    pub stable: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstalledKeg {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaskInfo {
    pub version: Option<String>,
    pub installed: Option<String>,
}

impl InfoDocument {
    /// Versions of the first entry of the requested kind.
    pub fn info(self, kind: PackageKind) -> Option<PackageInfo> {
        match kind {
            PackageKind::Formula => self.formulae.into_iter().next().map(|f| {
                let version = f.installed.into_iter().next().map(|k| k.version);
                PackageInfo {
                    installed: version.is_some(),
                    version,
                    latest: f.versions.stable,
                }
            }),
            PackageKind::Cask => self.casks.into_iter().next().map(|c| PackageInfo {
                installed: c.installed.is_some(),
                version: c.installed,
                latest: c.version,
            }),
            PackageKind::Tap => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(Package::formula("git").qualified_name(), "git");
        assert_eq!(
            Package::formula("terraform")
                .with_tap("hashicorp/tap")
                .qualified_name(),
            "hashicorp/tap/terraform"
        );
        assert_eq!(
            Package::formula("hashicorp/tap/terraform")
                .with_tap("hashicorp/tap")
                .qualified_name(),
            "hashicorp/tap/terraform"
        );
        assert_eq!(Package::tap("homebrew/cask").qualified_name(), "homebrew/cask");
    }

    #[test]
    fn test_display() {
        assert_eq!(Package::cask("docker").to_string(), "cask docker");
    }

    #[test]
    fn test_formula_info() {
        let json = r#"{
            "formulae": [{
                "name": "neovim",
                "versions": {"stable": "0.10.2", "head": "HEAD"},
                "installed": [{"version": "0.10.1", "installed_on_request": true}]
            }],
            "casks": []
        }"#;
        let doc: InfoDocument = serde_json::from_str(json).unwrap();
        let info = doc.info(PackageKind::Formula).unwrap();
        assert!(info.installed);
        assert_eq!(info.version.as_deref(), Some("0.10.1"));
        assert_eq!(info.latest.as_deref(), Some("0.10.2"));
    }

    #[test]
    fn test_formula_not_installed() {
        let json = r#"{"formulae": [{"versions": {"stable": "1.7.1"}, "installed": []}]}"#;
        let doc: InfoDocument = serde_json::from_str(json).unwrap();
        let info = doc.info(PackageKind::Formula).unwrap();
        assert!(!info.installed);
        assert_eq!(info.latest.as_deref(), Some("1.7.1"));
    }

    #[test]
    fn test_cask_info() {
        let json = r#"{"formulae": [], "casks": [{"token": "docker", "version": "4.34.0", "installed": null}]}"#;
        let doc: InfoDocument = serde_json::from_str(json).unwrap();
        let info = doc.info(PackageKind::Cask).unwrap();
        assert!(!info.installed);
        assert_eq!(info.version, None);
        assert_eq!(info.latest.as_deref(), Some("4.34.0"));
    }
}
