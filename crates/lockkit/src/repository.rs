//! Lockfile persistence

use crate::error::{Error, Result};
use crate::integrity;
use crate::types::{Lockfile, Mode};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage for a lockfile aggregate
pub trait Repository {
    /// Load the lockfile, or `None` if none has been written yet
    fn load(&self) -> Result<Option<Lockfile>>;

    fn save(&self, lockfile: &Lockfile) -> Result<()>;

    /// Load, or start a fresh lockfile in the given mode
    fn load_or_new(&self, mode: Mode) -> Result<Lockfile> {
        Ok(self.load()?.unwrap_or_else(|| Lockfile::new(mode)))
    }
}

/// Lockfile path for a configuration file: same path, `.lock` extension
pub fn lock_path_for(config: &Path) -> PathBuf {
    config.with_extension("lock")
}

/// YAML lockfile on disk
#[derive(Debug, Clone)]
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository next to a configuration file
    pub fn for_config(config: &Path) -> Self {
        Self::new(lock_path_for(config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Repository for FileRepository {
    fn load(&self) -> Result<Option<Lockfile>> {
        if !self.path.exists() {
            log::debug!("No lockfile at {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|source| Error::Read {
            path: self.path.clone(),
            source,
        })?;
        let lockfile: Lockfile = serde_yaml::from_str(&content).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })?;

        for key in integrity::tampered(&lockfile) {
            log::warn!(
                "Lockfile entry {key} in {} fails its integrity check",
                self.path.display()
            );
        }

        log::debug!(
            "Loaded lockfile {} ({} package(s), mode {})",
            self.path.display(),
            lockfile.len(),
            lockfile.mode
        );
        Ok(Some(lockfile))
    }

    fn save(&self, lockfile: &Lockfile) -> Result<()> {
        let write_err = |source: std::io::Error| Error::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let content = serde_yaml::to_string(lockfile)?;
        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        log::debug!("Saved lockfile {}", self.path.display());
        Ok(())
    }
}
