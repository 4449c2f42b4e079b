//! Pre-modify snapshots for file-affecting steps
//!
//! A [`FileSnapshot`] records what was at a path before a step touched it,
//! and restores exactly that on [`Undo::undo`]. Directories are recorded but
//! never removed or recreated.

use crate::step::Undo;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

/// Prior state of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorState {
    /// Nothing existed at the path
    Missing,
    /// A regular file with these contents
    File { contents: Vec<u8>, readonly: bool },
    /// A symlink pointing here
    Symlink { target: PathBuf },
    /// A directory (left untouched on undo)
    Directory,
}

/// Snapshot of a single path taken before a step modified it
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
    prior: PriorState,
}

impl FileSnapshot {
    /// Record the current state of `path`
    pub fn capture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let prior = match fs::symlink_metadata(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PriorState::Missing,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to inspect {}", path.display()));
            }
            Ok(meta) if meta.file_type().is_symlink() => PriorState::Symlink {
                target: fs::read_link(&path)
                    .with_context(|| format!("Failed to read symlink {}", path.display()))?,
            },
            Ok(meta) if meta.is_dir() => PriorState::Directory,
            Ok(meta) => PriorState::File {
                contents: fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                readonly: meta.permissions().readonly(),
            },
        };

        log::debug!("Captured {:?} snapshot of {}", kind_of(&prior), path.display());
        Ok(Self { path, prior })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prior(&self) -> &PriorState {
        &self.prior
    }

    /// Remove whatever a step left at the path (files and symlinks only)
    fn clear_current(&self) -> Result<()> {
        match fs::symlink_metadata(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", self.path.display())),
            Ok(meta) if meta.is_dir() => {
                bail!(
                    "{} is now a directory; refusing to remove it",
                    self.path.display()
                )
            }
            Ok(_) => fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

impl Undo for FileSnapshot {
    fn undo(&self) -> Result<()> {
        match &self.prior {
            PriorState::Directory => Ok(()),
            PriorState::Missing => self.clear_current(),
            PriorState::File { contents, readonly } => {
                self.clear_current()?;
                fs::write(&self.path, contents)
                    .with_context(|| format!("Failed to restore {}", self.path.display()))?;
                if *readonly {
                    let mut perms = fs::metadata(&self.path)?.permissions();
                    perms.set_readonly(true);
                    fs::set_permissions(&self.path, perms)?;
                }
                Ok(())
            }
            PriorState::Symlink { target } => {
                self.clear_current()?;
                restore_symlink(target, &self.path)
            }
        }
    }

    fn describe(&self) -> String {
        format!("restore {} ({})", self.path.display(), kind_of(&self.prior))
    }
}

fn kind_of(prior: &PriorState) -> &'static str {
    match prior {
        PriorState::Missing => "absent",
        PriorState::File { .. } => "file",
        PriorState::Symlink { .. } => "symlink",
        PriorState::Directory => "directory",
    }
}

#[cfg(unix)]
fn restore_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "Failed to restore symlink {} -> {}",
            link.display(),
            target.display()
        )
    })
}

#[cfg(windows)]
fn restore_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(target, link).with_context(|| {
        format!(
            "Failed to restore symlink {} -> {}",
            link.display(),
            target.display()
        )
    })
}

#[cfg(not(any(unix, windows)))]
fn restore_symlink(_target: &Path, link: &Path) -> Result<()> {
    bail!("Symlinks not supported on this platform: {}", link.display())
}
