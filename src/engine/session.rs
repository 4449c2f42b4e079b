//! One run of keel: configuration, lockfile, compiled graph and run context

use anyhow::{Context, Result};
use brewkit::Backend;
use declarative::{
    CancelToken, CompileOptions, ExecutionReport, FloatingResolver, Plan, Planner, RunContext,
    StepGraph, VersionResolver,
};
use lockkit::{
    Drift, FileRepository, LockResolver, LockUpdate, Lockfile, MachineInfo, Mode, Repository,
    ResolutionRecord,
};
use policy::{OrgReport, PolicyReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{self, LoadedConfig};
use crate::providers;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub config_files: Vec<PathBuf>,
    /// `--mode`, overriding config and lockfile
    pub mode: Option<Mode>,
    pub verbose: bool,
    pub cancel: CancelToken,
}

/// Policy and org policy results for a compiled graph
#[derive(Debug, Clone, Default)]
pub struct Findings {
    pub policy: Option<PolicyReport>,
    pub org: Option<OrgReport>,
}

impl Findings {
    /// Whether `apply` must refuse to run
    pub fn is_blocking(&self) -> bool {
        self.policy.as_ref().is_some_and(|r| !r.is_clean())
            || self.org.as_ref().is_some_and(OrgReport::is_blocking)
    }

    pub fn is_empty(&self) -> bool {
        self.policy.as_ref().is_none_or(PolicyReport::is_clean)
            && self.org.as_ref().is_none_or(|r| r.is_clean() && r.overridden.is_empty())
    }
}

pub struct Session {
    pub config: LoadedConfig,
    pub mode: Mode,
    repository: FileRepository,
    /// Lockfile as found on disk
    lockfile: Option<Lockfile>,
    /// `None` when resolving without a lockfile
    resolver: Option<Arc<LockResolver>>,
    pub graph: StepGraph,
    pub ctx: RunContext,
}

/// `--mode` beats the config's `lock.mode`, which beats the lockfile's own
fn effective_mode(
    cli: Option<Mode>,
    configured: Option<Mode>,
    lockfile: Option<&Lockfile>,
) -> Mode {
    cli.or(configured)
        .or_else(|| lockfile.map(|l| l.mode))
        .unwrap_or_default()
}

impl Session {
    /// Load configuration, choose a resolver and compile the step graph.
    ///
    /// Fails on compile errors and on any version that could not be resolved.
    pub fn open(options: SessionOptions, backend: Arc<dyn Backend>) -> Result<Self> {
        let config = config::load(&options.config_files)?;
        let repository = FileRepository::for_config(config.primary());
        let lockfile = repository.load()?;
        let mode = effective_mode(options.mode, config.settings.lock.mode, lockfile.as_ref());
        log::debug!("Reproducibility mode: {mode}");

        let root = config.root();
        let (resolver, dyn_resolver): (Option<Arc<LockResolver>>, Arc<dyn VersionResolver>) =
            if lockfile.is_none() && mode == Mode::Intent {
                log::debug!(
                    "No lockfile at {}, resolving floating versions",
                    repository.path().display()
                );
                (None, Arc::new(FloatingResolver))
            } else {
                let resolver = Arc::new(LockResolver::new(
                    lockfile.clone().unwrap_or_else(|| Lockfile::new(mode)),
                    mode,
                ));
                let shared: Arc<dyn VersionResolver> = resolver.clone();
                (Some(resolver), shared)
            };

        let compile_options = CompileOptions::new()
            .with_config_root(&root)
            .with_resolver(dyn_resolver);
        let graph = providers::compiler(backend)
            .compile(&config.raw, &compile_options)
            .context("Failed to compile configuration")?;
        log::info!("Compiled {} step(s)", graph.len());

        if let Some(resolver) = &resolver {
            resolver.ensure_resolved()?;
        }

        let ctx = RunContext::new(root)
            .with_verbose(options.verbose)
            .with_cancel_token(options.cancel);

        Ok(Self {
            config,
            mode,
            repository,
            lockfile,
            resolver,
            graph,
            ctx,
        })
    }

    pub fn plan(&self) -> Result<Plan> {
        Ok(Planner::new().plan(&self.graph, &self.ctx)?)
    }

    pub fn lock_path(&self) -> &Path {
        self.repository.path()
    }

    pub fn lockfile(&self) -> Option<&Lockfile> {
        self.lockfile.as_ref()
    }

    /// Resolutions made while compiling (empty without a lockfile)
    pub fn resolutions(&self) -> Vec<ResolutionRecord> {
        self.resolver
            .as_ref()
            .map(|r| r.resolutions())
            .unwrap_or_default()
    }

    pub fn drift(&self) -> Vec<Drift> {
        self.resolver
            .as_ref()
            .map(|r| r.lockfile().drift_report(&r.resolutions()))
            .unwrap_or_default()
    }

    pub fn findings(&self) -> Result<Findings> {
        let policy = self.config.policy()?.map(|p| p.evaluate_graph(&self.graph));
        let org = self
            .config
            .org_policy()?
            .map(|p| p.evaluate_graph(&self.graph));
        Ok(Findings { policy, org })
    }

    /// Refresh the lockfile and write it next to the config
    ///
    /// With a `report`, only steps the run applied or found satisfied are
    /// locked; without one the plan statuses decide.
    pub fn update_lock(
        &self,
        plan: &Plan,
        report: Option<&ExecutionReport>,
    ) -> Result<LockUpdate> {
        let mut lockfile = match &self.lockfile {
            Some(existing) => existing.clone(),
            None => self.repository.load_or_new(self.mode)?,
        };
        lockfile.mode = self.mode;
        lockfile.machine = MachineInfo::current();

        let update = match report {
            Some(report) => lockfile.update_from_run(plan, report, &self.ctx),
            None => lockfile.update_from_plan(plan, &self.ctx),
        };
        self.repository
            .save(&lockfile)
            .with_context(|| format!("Failed to save {}", self.lock_path().display()))?;
        log::info!(
            "Lockfile {}: {} added, {} updated, {} removed",
            self.lock_path().display(),
            update.added.len(),
            update.updated.len(),
            update.removed.len()
        );
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewkit::{Package, PackageInfo};
    use declarative::{Executor, NoProgress, ResultStatus, StepId, StepStatus};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Homebrew with a fixed set of installed packages
    #[derive(Default)]
    struct StaticBackend {
        installed: HashMap<String, String>,
        latest: HashMap<String, String>,
    }

    impl StaticBackend {
        fn with(mut self, name: &str, installed: &str, latest: &str) -> Self {
            self.installed.insert(name.to_string(), installed.to_string());
            self.latest.insert(name.to_string(), latest.to_string());
            self
        }
    }

    impl Backend for StaticBackend {
        fn is_available(&self) -> bool {
            true
        }

        fn info(&self, package: &Package) -> brewkit::Result<PackageInfo> {
            let version = self.installed.get(&package.name).cloned();
            Ok(PackageInfo {
                installed: version.is_some(),
                version,
                latest: self.latest.get(&package.name).cloned(),
            })
        }

        fn install(&self, _package: &Package) -> brewkit::Result<()> {
            Ok(())
        }

        fn upgrade(&self, _package: &Package) -> brewkit::Result<()> {
            Ok(())
        }
    }

    fn options(config: &Path) -> SessionOptions {
        SessionOptions {
            config_files: vec![config.to_path_buf()],
            ..SessionOptions::default()
        }
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_effective_mode_precedence() {
        let lockfile = Lockfile::new(Mode::Frozen);
        assert_eq!(
            effective_mode(Some(Mode::Intent), Some(Mode::Locked), Some(&lockfile)),
            Mode::Intent
        );
        assert_eq!(
            effective_mode(None, Some(Mode::Locked), Some(&lockfile)),
            Mode::Locked
        );
        assert_eq!(effective_mode(None, None, Some(&lockfile)), Mode::Frozen);
        assert_eq!(effective_mode(None, None, None), Mode::Intent);
    }

    #[test]
    fn test_open_without_lockfile_floats() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "brew:\n  formulae: [git]\n");
        let backend = Arc::new(StaticBackend::default().with("git", "2.43.0", "2.44.0"));

        let session = Session::open(options(&config), backend).unwrap();
        assert_eq!(session.mode, Mode::Intent);
        assert!(session.lockfile().is_none());
        assert!(session.resolutions().is_empty());
        assert!(
            session
                .graph
                .contains(&StepId::new("brew:formula:git").unwrap())
        );
        assert_eq!(session.lock_path(), dir.path().join("config.lock"));
    }

    #[test]
    fn test_frozen_without_lockfile_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "lock:\n  mode: frozen\nbrew:\n  formulae: [git]\n");
        let backend = Arc::new(StaticBackend::default().with("git", "2.43.0", "2.44.0"));

        let err = Session::open(options(&config), backend).err().unwrap();
        assert!(format!("{err:#}").contains("brew:git"));
    }

    #[test]
    fn test_update_lock_then_locked_run_reports_drift() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "brew:\n  formulae: [git]\n");
        let backend = Arc::new(StaticBackend::default().with("git", "2.43.0", "2.43.0"));

        let session = Session::open(options(&config), backend).unwrap();
        let plan = session.plan().unwrap();
        let update = session.update_lock(&plan, None).unwrap();
        assert_eq!(update.added, vec!["brew:git".to_string()]);

        let backend = Arc::new(StaticBackend::default().with("git", "2.43.0", "2.44.0"));
        let mut opts = options(&config);
        opts.mode = Some(Mode::Locked);
        let session = Session::open(opts, backend).unwrap();
        assert_eq!(session.lockfile().unwrap().locked_version("brew", "git"), Some("2.43.0"));
        let drift = session.drift();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].locked, "2.43.0");
        assert_eq!(drift[0].available.as_deref(), Some("2.44.0"));
    }

    #[test]
    fn test_update_lock_skips_steps_not_run() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("blocked")).unwrap();
        let config = write_config(
            &dir,
            "files:\n  write:\n    - { path: blocked, content: x }\nbrew:\n  formulae:\n    - { name: node, version: 22.9.0, after: [\"file:write:blocked\"] }\n",
        );
        let backend = Arc::new(StaticBackend::default());

        let session = Session::open(options(&config), backend).unwrap();
        let plan = session.plan().unwrap();
        let node = StepId::new("brew:formula:node").unwrap();
        assert_eq!(plan.get(&node).unwrap().status, StepStatus::NeedsApply);

        let report = Executor::new()
            .execute(&plan, &session.ctx, &mut NoProgress)
            .unwrap();
        assert_eq!(report.get(&node).unwrap().status, ResultStatus::Skipped);

        let update = session.update_lock(&plan, Some(&report)).unwrap();
        assert!(!update.has_changes());
        let saved = FileRepository::new(session.lock_path()).load().unwrap().unwrap();
        assert!(saved.get("brew", "node").is_none());
    }

    #[test]
    fn test_findings_deny_casks() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            "policy:\n  rules:\n    - { action: deny, pattern: \"brew:cask:*\" }\nbrew:\n  formulae: [git]\n  casks: [docker]\n",
        );
        let backend = Arc::new(StaticBackend::default());

        let session = Session::open(options(&config), backend).unwrap();
        let findings = session.findings().unwrap();
        let report = findings.policy.as_ref().unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].id.as_str(), "brew:cask:docker");
        assert!(findings.is_blocking());
        assert!(findings.org.is_none());
    }

    #[test]
    fn test_findings_empty_without_policies() {
        let findings = Findings::default();
        assert!(findings.is_empty());
        assert!(!findings.is_blocking());
    }
}
