//! Error types for the policy crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading policies
#[derive(Error, Debug)]
pub enum Error {
    /// Pattern is empty
    #[error("pattern must not be empty")]
    EmptyPattern,

    /// Pattern could not be compiled
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Policy file could not be read
    #[error("failed to read policy file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy file is not valid
    #[error("failed to parse policy file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, Error>;
