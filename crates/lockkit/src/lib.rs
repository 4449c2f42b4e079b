//! # Lockkit
//!
//! Lockfiles and reproducibility modes for declarative machine configuration.
//!
//! - [`Lockfile`]: the aggregate (`mode`, `machine`, `packages`)
//! - [`Repository`]: where it lives ([`FileRepository`] writes YAML next to
//!   the configuration file)
//! - [`LockResolver`]: a [`declarative::VersionResolver`] that applies the
//!   Intent / Locked / Frozen contract and records every decision
//! - [`Lockfile::update_from_plan`] / [`Lockfile::update_from_run`]: refresh
//!   entries after planning or after an apply run
//!
//! ## Example
//!
//! ```no_run
//! use lockkit::{FileRepository, LockResolver, Mode, Repository};
//! use std::path::Path;
//!
//! let repo = FileRepository::for_config(Path::new("config.yaml"));
//! let lockfile = repo.load_or_new(Mode::Locked)?;
//! let resolver = LockResolver::new(lockfile, Mode::Locked);
//! // ... compile with the resolver, then:
//! resolver.ensure_resolved()?;
//! # Ok::<(), lockkit::Error>(())
//! ```

mod error;
pub mod integrity;
mod repository;
mod resolver;
mod types;
mod update;

pub use error::{Error, Result};
pub use repository::{FileRepository, Repository, lock_path_for};
pub use resolver::{LockResolver, resolve};
pub use types::{
    Drift, Integrity, Lockfile, MachineInfo, Mode, PackageLock, ResolutionRecord, Upsert, lock_key,
};
pub use update::LockUpdate;
