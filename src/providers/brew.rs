//! Homebrew provider
//!
//! ```yaml
//! brew:
//!   taps: [homebrew/cask, hashicorp/tap]
//!   formulae:
//!     - git
//!     - { name: terraform, tap: hashicorp/tap }
//!     - { name: node, version: "22.9.0" }
//!   casks: [docker]
//! ```
//!
//! Produces `brew:tap:<tap>`, `brew:formula:<name>` and `brew:cask:<name>`.
//! A package with a `tap` depends on that tap's step (declaring the tap if
//! the section does not); a cask without one depends on
//! `brew:tap:homebrew/cask` when that tap is declared.
//!
//! Versions: an explicit `version` is required as-is. Otherwise the version
//! resolver decides; only a locked or pinned resolution is enforced, a
//! floating one accepts whatever is installed.

use anyhow::{Context, Result, anyhow};
use brewkit::{Backend, Package, PackageKind};
use declarative::{
    BoxedStep, CompileContext, Diff, ExplainContext, Explanation, LockInfo, Lockable, Provider,
    RunContext, Source, Step, StepId, StepStatus, Versioned,
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::{parse_after, push_unique};

pub const PROVIDER: &str = "brew";
const CASK_TAP: &str = "homebrew/cask";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BrewSection {
    taps: Vec<Entry>,
    formulae: Vec<Entry>,
    casks: Vec<Entry>,
}

/// A bare name or a detailed entry
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Name(String),
    Detailed(EntrySpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntrySpec {
    name: String,
    #[serde(default)]
    tap: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    after: Vec<String>,
}

impl Entry {
    fn into_spec(self) -> EntrySpec {
        match self {
            Self::Name(name) => EntrySpec {
                name,
                tap: None,
                version: None,
                after: Vec::new(),
            },
            Self::Detailed(spec) => spec,
        }
    }
}

pub struct BrewProvider {
    backend: Arc<dyn Backend>,
}

impl BrewProvider {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Latest version Homebrew offers, when it can be asked
    fn latest_version(&self, available: bool, package: &Package) -> Option<String> {
        if !available {
            return None;
        }
        match self.backend.latest_version(package) {
            Ok(version) => version,
            Err(e) => {
                log::debug!("Could not look up latest version of {package}: {e}");
                None
            }
        }
    }
}

impl Provider for BrewProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<BoxedStep>> {
        let section: BrewSection = ctx.decode(PROVIDER)?;
        let available = self.backend.is_available();
        if !available {
            log::debug!("Homebrew not found; versions resolve without a latest version");
        }

        let mut taps: Vec<EntrySpec> = section.taps.into_iter().map(Entry::into_spec).collect();
        let packages: Vec<(PackageKind, EntrySpec)> = section
            .formulae
            .into_iter()
            .map(|e| (PackageKind::Formula, e.into_spec()))
            .chain(
                section
                    .casks
                    .into_iter()
                    .map(|e| (PackageKind::Cask, e.into_spec())),
            )
            .collect();

        for tap in packages.iter().filter_map(|(_, spec)| spec.tap.as_deref()) {
            if !taps.iter().any(|t| t.name == tap) {
                log::debug!("Declaring tap {tap} referenced by a package");
                taps.push(Entry::Name(tap.to_string()).into_spec());
            }
        }
        let cask_tap_declared = taps.iter().any(|t| t.name == CASK_TAP);

        let mut steps: Vec<BoxedStep> = Vec::with_capacity(taps.len() + packages.len());

        for tap in taps {
            let id = StepId::from_parts(PROVIDER, "tap", &tap.name)?;
            let mut depends_on = Vec::new();
            push_unique(&mut depends_on, parse_after(id.as_str(), &tap.after)?);
            steps.push(Box::new(BrewStep {
                id,
                package: Package::tap(tap.name),
                depends_on,
                version: VersionRequirement::Any,
                available,
                backend: Arc::clone(&self.backend),
            }));
        }

        for (kind, spec) in packages {
            let id = StepId::from_parts(PROVIDER, kind.as_str(), &spec.name)?;

            let mut depends_on = Vec::new();
            match spec.tap.as_deref() {
                Some(tap) => depends_on.push(StepId::from_parts(PROVIDER, "tap", tap)?),
                None if kind == PackageKind::Cask && cask_tap_declared => {
                    depends_on.push(StepId::from_parts(PROVIDER, "tap", CASK_TAP)?);
                }
                None => {}
            }
            push_unique(&mut depends_on, parse_after(id.as_str(), &spec.after)?);

            let configured_version = spec.version.is_some();
            let mut package = Package::new(spec.name, kind);
            if let Some(tap) = spec.tap {
                package = package.with_tap(tap);
            }

            let candidate = spec
                .version
                .or_else(|| self.latest_version(available, &package));
            let resolution = ctx
                .resolver()
                .resolve(PROVIDER, &package.name, candidate.as_deref());
            let version = match (resolution.source, resolution.version, candidate) {
                (source @ (Source::Locked | Source::Pinned), Some(version), _) => {
                    VersionRequirement::Resolved(source, version)
                }
                (_, _, Some(configured)) if configured_version => {
                    VersionRequirement::Configured(configured)
                }
                _ => VersionRequirement::Any,
            };

            steps.push(Box::new(BrewStep {
                id,
                package,
                depends_on,
                version,
                available,
                backend: Arc::clone(&self.backend),
            }));
        }

        Ok(steps)
    }
}

/// Which installed version satisfies a step
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionRequirement {
    /// Anything installed
    Any,
    /// `version:` in the configuration
    Configured(String),
    /// Decided by the resolver from the lockfile
    Resolved(Source, String),
}

impl VersionRequirement {
    fn version(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Configured(v) | Self::Resolved(_, v) => Some(v),
        }
    }
}

pub struct BrewStep {
    id: StepId,
    package: Package,
    depends_on: Vec<StepId>,
    version: VersionRequirement,
    available: bool,
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for BrewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrewStep")
            .field("id", &self.id)
            .field("package", &self.package)
            .field("depends_on", &self.depends_on)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl BrewStep {
    fn brew_error(&self, action: &str, e: brewkit::Error) -> anyhow::Error {
        let advice = e.category().advice();
        anyhow!(e).context(format!("Failed to {action} {} ({advice})", self.package))
    }

    fn version_matches(&self, installed: Option<&str>) -> bool {
        self.version
            .version()
            .is_none_or(|required| installed == Some(required))
    }
}

impl Step for BrewStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.depends_on
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        if !self.available {
            return Ok(StepStatus::NeedsApply);
        }
        let info = self
            .backend
            .info(&self.package)
            .map_err(|e| self.brew_error("inspect", e))?;
        if info.installed && self.version_matches(info.version.as_deref()) {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::NeedsApply)
        }
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        let kind = self.package.kind.as_str();
        let name = self.package.qualified_name();
        let wanted = self.version.version().map(str::to_string);

        if !self.available {
            return Ok(Diff::add(kind, name, wanted));
        }

        let info = self
            .backend
            .info(&self.package)
            .map_err(|e| self.brew_error("inspect", e))?;
        if info.installed {
            Ok(Diff::modify(kind, name, info.version, wanted))
        } else {
            Ok(Diff::add(kind, name, wanted.or(info.latest)))
        }
    }

    fn apply(&self, _ctx: &RunContext) -> Result<()> {
        if self.backend.is_installed(&self.package).map_err(|e| self.brew_error("inspect", e))? {
            self.backend
                .upgrade(&self.package)
                .map_err(|e| self.brew_error("upgrade", e))?;
        } else {
            self.backend
                .install(&self.package)
                .map_err(|e| self.brew_error("install", e))?;
        }

        if let Some(required) = self.version.version() {
            let installed = self
                .backend
                .installed_version(&self.package)
                .map_err(|e| self.brew_error("inspect", e))?;
            if installed.as_deref() != Some(required) {
                return Err(brewkit::Error::VersionMismatch {
                    name: self.package.name.clone(),
                    requested: required.to_string(),
                    installed: installed.unwrap_or_else(|| "nothing".to_string()),
                }
                .into());
            }
        }

        log::info!("Installed {}", self.package);
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let name = self.package.qualified_name();
        let mut explanation = match self.package.kind {
            PackageKind::Tap => Explanation::new(format!("Tap the Homebrew repository {name}"))
                .with_detail(
                    "Adds a third-party repository so formulae and casks from it can be installed.",
                )
                .with_link("https://docs.brew.sh/Taps"),
            PackageKind::Formula => Explanation::new(format!("Install the Homebrew formula {name}"))
                .with_link(format!("https://formulae.brew.sh/formula/{}", self.package.name)),
            PackageKind::Cask => Explanation::new(format!("Install the Homebrew cask {name}"))
                .with_detail("Casks install macOS applications and may prompt for a password.")
                .with_link(format!("https://formulae.brew.sh/cask/{}", self.package.name)),
        };

        explanation = match &self.version {
            VersionRequirement::Any if self.package.kind == PackageKind::Tap => explanation,
            VersionRequirement::Any => explanation.with_tradeoff(
                "No version is enforced; any installed version satisfies this step.",
            ),
            VersionRequirement::Configured(v) => explanation
                .with_tradeoff(format!("Version {v} is set in the configuration.")),
            VersionRequirement::Resolved(source, v) => explanation
                .with_tradeoff(format!("Version {v} comes from the lockfile ({source}).")),
        };

        if ctx.verbose && self.version.version().is_some() {
            explanation = explanation.with_tradeoff(
                "Homebrew only installs the current version of a package; a required version \
                 it no longer offers fails at apply time.",
            );
        }
        explanation
    }

    fn resource_key(&self) -> String {
        // Homebrew serializes installs behind a global lock
        PROVIDER.to_string()
    }

    fn as_lockable(&self) -> Option<&dyn Lockable> {
        (self.package.kind != PackageKind::Tap).then_some(self as &dyn Lockable)
    }

    fn as_versioned(&self) -> Option<&dyn Versioned> {
        (self.package.kind != PackageKind::Tap).then_some(self as &dyn Versioned)
    }
}

impl Lockable for BrewStep {
    fn lock_info(&self) -> Option<LockInfo> {
        Some(
            LockInfo::new(PROVIDER, self.package.name.clone())
                .with_version(self.version.version().map(str::to_string)),
        )
    }
}

impl Versioned for BrewStep {
    fn installed_version(&self, _ctx: &RunContext) -> Result<Option<String>> {
        if !self.available {
            return Ok(None);
        }
        self.backend
            .installed_version(&self.package)
            .with_context(|| format!("Failed to read installed version of {}", self.package))
    }
}
