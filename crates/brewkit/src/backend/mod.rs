//! Backend abstraction over Homebrew.
//!
//! [`BrewBackend`] drives the real `brew` CLI; callers that need a fake
//! implement [`Backend`] themselves.

pub mod brew;

pub use brew::BrewBackend;

use crate::error::Result;
use crate::types::{Package, PackageInfo};

pub trait Backend: Send + Sync {
    /// Whether `brew` can be invoked at all.
    fn is_available(&self) -> bool;

    /// Installed and latest versions. Taps report no versions.
    fn info(&self, package: &Package) -> Result<PackageInfo>;

    fn install(&self, package: &Package) -> Result<()>;

    fn upgrade(&self, package: &Package) -> Result<()>;

    fn is_installed(&self, package: &Package) -> Result<bool> {
        Ok(self.info(package)?.installed)
    }

    fn installed_version(&self, package: &Package) -> Result<Option<String>> {
        Ok(self.info(package)?.version)
    }

    fn latest_version(&self, package: &Package) -> Result<Option<String>> {
        Ok(self.info(package)?.latest)
    }
}
