//! Homebrew errors, categorized from `brew` stderr.

use thiserror::Error;

/// Broad class of a failed `brew` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    NotFound,
    Conflict,
    Permission,
    AlreadyInstalled,
    BrewNotFound,
    Other,
}

impl ErrorCategory {
    /// The requested state already holds.
    pub fn is_ignorable(self) -> bool {
        matches!(self, Self::AlreadyInstalled)
    }

    pub fn advice(self) -> &'static str {
        match self {
            Self::Network => "check your internet connection and try again",
            Self::NotFound => "verify the package name or declare the tap it comes from",
            Self::Conflict => "remove the conflicting package first",
            Self::Permission => "check permissions on the Homebrew prefix",
            Self::AlreadyInstalled => "nothing to do",
            Self::BrewNotFound => "install Homebrew from https://brew.sh",
            Self::Other => "see the brew output above",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("package not found: {name}")]
    NotFound { name: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("permission denied: {message}")]
    Permission { message: String },

    #[error("already installed: {name}")]
    AlreadyInstalled { name: String },

    #[error("Homebrew not found. Install it from https://brew.sh")]
    BrewNotFound,

    #[error("{name}: requested version {requested}, but {installed} is installed")]
    VersionMismatch {
        name: String,
        requested: String,
        installed: String,
    },

    #[error("command failed: {message}")]
    CommandFailed { message: String, stderr: String },

    #[error("failed to parse brew output: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } | Self::VersionMismatch { .. } => ErrorCategory::Conflict,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Self::BrewNotFound => ErrorCategory::BrewNotFound,
            Self::CommandFailed { .. } | Self::Json(_) => ErrorCategory::Other,
        }
    }

    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Categorize a failed invocation from its stderr.
    pub fn from_brew_output(stderr: &str, package: Option<&str>) -> Self {
        let lower = stderr.to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        let name = || package.unwrap_or("unknown").to_string();
        let message = stderr.trim().to_string();

        if contains_any(&[
            "curl",
            "could not resolve",
            "connection refused",
            "timed out",
            "failed to download",
            "sha256 mismatch",
        ]) {
            return Self::Network { message };
        }

        if contains_any(&[
            "no available formula",
            "no formulae found",
            "no cask with this name",
            "no such keg",
            "couldn't find",
        ]) {
            return Self::NotFound { name: name() };
        }

        if contains_any(&["already installed", "is already an installed"]) {
            return Self::AlreadyInstalled { name: name() };
        }

        if contains_any(&["conflict", "depends on", "is a dependency"]) {
            return Self::Conflict { message };
        }

        if contains_any(&["permission denied", "operation not permitted", "cannot write"]) {
            return Self::Permission { message };
        }

        Self::CommandFailed {
            message: format!(
                "brew failed{}",
                package.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
