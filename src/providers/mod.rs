//! Providers shipped with keel
//!
//! - [`brew::BrewProvider`]: `brew` section (taps, formulae, casks)
//! - [`files::FilesProvider`]: `files` section (symlinks, written files)
//!
//! Every entry accepts `after: [step-id]` for explicit cross-provider
//! ordering.

pub mod brew;
pub mod files;

use anyhow::{Context, Result};
use brewkit::Backend;
use declarative::{Compiler, StepId};
use std::sync::Arc;

/// A compiler with every built-in provider registered
pub fn compiler(backend: Arc<dyn Backend>) -> Compiler {
    Compiler::new()
        .with_provider(brew::BrewProvider::new(backend))
        .with_provider(files::FilesProvider)
}

/// Parse `after` entries of the entry identified by `owner`
fn parse_after(owner: &str, after: &[String]) -> Result<Vec<StepId>> {
    after
        .iter()
        .map(|raw| {
            StepId::new(raw.as_str()).with_context(|| format!("Invalid 'after' entry on {owner}"))
        })
        .collect()
}

/// Append `extra` to `deps`, keeping first occurrences only
fn push_unique(deps: &mut Vec<StepId>, extra: impl IntoIterator<Item = StepId>) {
    for id in extra {
        if !deps.contains(&id) {
            deps.push(id);
        }
    }
}
