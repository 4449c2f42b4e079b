//! Error types for the lockkit crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving or resolving against a lockfile
#[derive(Error, Debug)]
pub enum Error {
    /// Lockfile could not be read
    #[error("failed to read lockfile {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lockfile could not be written
    #[error("failed to write lockfile {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lockfile is not valid YAML or has the wrong shape
    #[error("failed to parse lockfile {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Lockfile could not be serialized
    #[error("failed to serialize lockfile: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// Unrecognized reproducibility mode
    #[error("unknown lock mode '{0}' (expected intent, locked or frozen)")]
    InvalidMode(String),

    /// One or more packages could not be resolved under the current mode
    #[error("{} package(s) could not be resolved: {}", .failures.len(), .failures.join("; "))]
    Unresolved { failures: Vec<String> },
}

/// Result type for lockkit operations
pub type Result<T> = std::result::Result<T, Error>;
