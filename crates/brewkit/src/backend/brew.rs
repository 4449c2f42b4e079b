//! Backend that shells out to the `brew` executable.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{InfoDocument, Package, PackageInfo};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const KNOWN_LOCATIONS: [&str; 3] = [
    "/opt/homebrew/bin/brew",
    "/usr/local/bin/brew",
    "/home/linuxbrew/.linuxbrew/bin/brew",
];

#[derive(Debug, Clone)]
pub struct BrewBackend {
    brew_path: Option<PathBuf>,
}

impl BrewBackend {
    /// Locate `brew`, failing if it is not installed.
    pub fn new() -> Result<Self> {
        let backend = Self::detect();
        if backend.brew_path.is_none() {
            return Err(Error::BrewNotFound);
        }
        Ok(backend)
    }

    /// Locate `brew` if present. Every operation except
    /// [`Backend::is_available`] fails with [`Error::BrewNotFound`] when it
    /// is not.
    pub fn detect() -> Self {
        match find_brew() {
            Some(path) => Self::with_path(path),
            None => Self { brew_path: None },
        }
    }

    /// Use a specific `brew` executable
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            brew_path: Some(path.into()),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let brew = self.brew_path.as_deref().ok_or(Error::BrewNotFound)?;
        log::debug!("Running {} {}", brew.display(), args.join(" "));
        Command::new(brew)
            .args(args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute brew: {e}"),
                stderr: String::new(),
            })
    }

    fn run_checked(&self, args: &[&str], package: &Package) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = Error::from_brew_output(&stderr, Some(&package.name));
            if err.is_ignorable() {
                log::debug!("Ignoring brew error for {package}: {err}");
                return Ok(String::new());
            }
            return Err(err);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn tap_info(&self, package: &Package) -> Result<PackageInfo> {
        let output = self.run(&["tap"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_brew_output(&stderr, None));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(PackageInfo {
            installed: list_contains_tap(&stdout, &package.name),
            ..PackageInfo::default()
        })
    }
}

impl Backend for BrewBackend {
    fn is_available(&self) -> bool {
        self.run(&["--version"])
            .is_ok_and(|output| output.status.success())
    }

    fn info(&self, package: &Package) -> Result<PackageInfo> {
        let Some(flag) = package.kind.flag() else {
            return self.tap_info(package);
        };

        let name = package.qualified_name();
        let output = self.run(&["info", "--json=v2", flag, &name])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_brew_output(&stderr, Some(&package.name)));
        }

        let document: InfoDocument = serde_json::from_slice(&output.stdout)?;
        document.info(package.kind).ok_or_else(|| Error::NotFound {
            name: package.name.clone(),
        })
    }

    fn install(&self, package: &Package) -> Result<()> {
        let name = package.qualified_name();
        match package.kind.flag() {
            None => self.run_checked(&["tap", &name], package)?,
            Some(flag) => self.run_checked(&["install", flag, &name], package)?,
        };
        Ok(())
    }

    fn upgrade(&self, package: &Package) -> Result<()> {
        let Some(flag) = package.kind.flag() else {
            return Ok(());
        };
        let name = package.qualified_name();
        self.run_checked(&["upgrade", flag, &name], package)?;
        Ok(())
    }
}

fn find_brew() -> Option<PathBuf> {
    if let Some(path) = KNOWN_LOCATIONS
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
    {
        return Some(path.to_path_buf());
    }

    let output = Command::new("which").arg("brew").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// `brew tap` prints one tap per line, lowercased.
fn list_contains_tap(listing: &str, tap: &str) -> bool {
    listing
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case(tap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_contains_tap() {
        let listing = "homebrew/bundle\nhomebrew/cask\nhashicorp/tap\n";
        assert!(list_contains_tap(listing, "homebrew/cask"));
        assert!(list_contains_tap(listing, "HashiCorp/tap"));
        assert!(!list_contains_tap(listing, "homebrew/cask-fonts"));
    }

    #[test]
    fn test_missing_brew_fails_cleanly() {
        let backend = BrewBackend {
            brew_path: None,
        };
        assert!(!backend.is_available());
        assert!(matches!(
            backend.info(&Package::formula("git")),
            Err(Error::BrewNotFound)
        ));
        assert!(matches!(
            backend.install(&Package::tap("homebrew/cask")),
            Err(Error::BrewNotFound)
        ));
    }

    #[test]
    fn test_nonexistent_binary_is_unavailable() {
        let backend = BrewBackend::with_path("/nonexistent/keel-test/brew");
        assert!(!backend.is_available());
        assert!(matches!(
            backend.info(&Package::cask("docker")),
            Err(Error::CommandFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_tap_listing_is_an_error() {
        let backend = BrewBackend::with_path("/bin/false");
        assert!(matches!(
            backend.info(&Package::tap("homebrew/cask")),
            Err(Error::CommandFailed { .. })
        ));
    }
}
