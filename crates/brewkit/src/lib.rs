//! # brewkit
//!
//! Homebrew operations for taps, formulae and casks behind a [`Backend`]
//! trait, so callers can substitute a fake in tests.
//!
//! ## Example
//!
//! ```no_run
//! use brewkit::{Backend, BrewBackend, Package};
//!
//! let brew = BrewBackend::new()?;
//! let neovim = Package::formula("neovim");
//! if !brew.is_installed(&neovim)? {
//!     brew.install(&neovim)?;
//! }
//! println!("{:?}", brew.installed_version(&neovim)?);
//! # Ok::<(), brewkit::Error>(())
//! ```

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{Backend, BrewBackend};
pub use error::{Error, ErrorCategory, Result};
pub use types::{Package, PackageInfo, PackageKind};
