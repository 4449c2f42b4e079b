//! Files provider: symlinks and written files
//!
//! ```yaml
//! files:
//!   links:
//!     - { source: zsh/.zshrc, target: ~/.zshrc, after: [brew:formula:zsh] }
//!   write:
//!     - { path: ~/.config/git/ignore, content: ".DS_Store\n" }
//! ```
//!
//! Relative sources and paths resolve against the configuration directory.
//! Both step kinds snapshot their path before applying and can be rolled
//! back.

use anyhow::{Context, Result, bail};
use declarative::{
    BoxedStep, CompileContext, Diff, ExplainContext, Explanation, FileSnapshot, Provider,
    Revertible, RunContext, Step, StepId, StepStatus, Undo,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{parse_after, push_unique};
use crate::paths;

pub const SECTION: &str = "files";
const ID_PREFIX: &str = "file";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FilesSection {
    links: Vec<LinkEntry>,
    write: Vec<WriteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkEntry {
    source: String,
    target: String,
    #[serde(default)]
    after: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteEntry {
    path: String,
    content: String,
    #[serde(default)]
    after: Vec<String>,
}

pub struct FilesProvider;

impl Provider for FilesProvider {
    fn name(&self) -> &str {
        SECTION
    }

    fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<BoxedStep>> {
        let section: FilesSection = ctx.decode(SECTION)?;
        let root = ctx.config_root();
        let mut steps: Vec<BoxedStep> = Vec::new();

        for link in section.links {
            let id = StepId::from_parts(ID_PREFIX, "link", &link.target)?;
            let mut depends_on = Vec::new();
            push_unique(&mut depends_on, parse_after(id.as_str(), &link.after)?);
            steps.push(Box::new(LinkStep {
                id,
                source: paths::resolve(&link.source, root),
                target: paths::resolve(&link.target, root),
                depends_on,
            }));
        }

        for file in section.write {
            let id = StepId::from_parts(ID_PREFIX, "write", &file.path)?;
            let mut depends_on = Vec::new();
            push_unique(&mut depends_on, parse_after(id.as_str(), &file.after)?);
            steps.push(Box::new(WriteStep {
                id,
                path: paths::resolve(&file.path, root),
                content: file.content,
                depends_on,
            }));
        }

        Ok(steps)
    }
}

/// What currently sits at a link target
#[derive(Debug, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    /// A regular file or directory; never replaced
    Occupied,
}

#[derive(Debug)]
pub struct LinkStep {
    id: StepId,
    source: PathBuf,
    target: PathBuf,
    depends_on: Vec<StepId>,
}

impl LinkStep {
    fn state(&self) -> Result<LinkState> {
        let meta = match fs::symlink_metadata(&self.target) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LinkState::Missing),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to inspect {}", self.target.display()));
            }
            Ok(meta) => meta,
        };

        if !meta.file_type().is_symlink() {
            return Ok(LinkState::Occupied);
        }

        let link = fs::read_link(&self.target)
            .with_context(|| format!("Failed to read symlink {}", self.target.display()))?;
        let actual = if link.is_absolute() {
            link
        } else {
            self.target
                .parent()
                .map_or_else(|| link.clone(), |parent| parent.join(&link))
        };

        let same = actual == self.source
            || matches!(
                (actual.canonicalize(), self.source.canonicalize()),
                (Ok(a), Ok(b)) if a == b
            );
        Ok(if same {
            LinkState::Correct
        } else {
            LinkState::WrongTarget(actual)
        })
    }

    fn create(&self) -> Result<()> {
        if !self.source.exists() {
            bail!("Source does not exist: {}", self.source.display());
        }
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        if self.target.is_symlink() {
            fs::remove_file(&self.target).with_context(|| {
                format!("Failed to remove existing symlink {}", self.target.display())
            })?;
        }
        symlink(&self.source, &self.target).with_context(|| {
            format!(
                "Failed to create symlink {} -> {}",
                self.target.display(),
                self.source.display()
            )
        })
    }
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if source.is_dir() {
        // Junctions need no elevation
        junction::create(source, target).or_else(|e| {
            log::debug!("Junction creation failed ({e}), trying symlink_dir");
            symlink_dir(source, target)
        })
    } else {
        symlink_file(source, target)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

impl Step for LinkStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.depends_on
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        Ok(match self.state()? {
            LinkState::Correct => StepStatus::Satisfied,
            LinkState::Missing | LinkState::WrongTarget(_) => StepStatus::NeedsApply,
            LinkState::Occupied => {
                log::warn!(
                    "Not replacing {}: it exists and is not a symlink",
                    self.target.display()
                );
                StepStatus::Skipped
            }
        })
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        let target = self.target.display().to_string();
        let wanted = Some(format!("-> {}", self.source.display()));
        Ok(match self.state()? {
            LinkState::WrongTarget(actual) => Diff::modify(
                "symlink",
                target,
                Some(format!("-> {}", actual.display())),
                wanted,
            ),
            _ => Diff::add("symlink", target, wanted),
        })
    }

    fn apply(&self, _ctx: &RunContext) -> Result<()> {
        if self.state()? == LinkState::Occupied {
            bail!("{} exists and is not a symlink", self.target.display());
        }
        self.create()?;
        log::info!(
            "Linked {} -> {}",
            self.target.display(),
            self.source.display()
        );
        Ok(())
    }

    fn explain(&self, _ctx: &ExplainContext) -> Explanation {
        Explanation::new(format!(
            "Symlink {} to {}",
            self.target.display(),
            self.source.display()
        ))
        .with_detail("Keeps the file under version control while the program reads it from its usual location.")
        .with_tradeoff("An existing regular file at the target is left alone and the step is skipped.")
    }

    fn resource_key(&self) -> String {
        self.target.display().to_string()
    }

    fn as_revertible(&self) -> Option<&dyn Revertible> {
        Some(self)
    }
}

impl Revertible for LinkStep {
    fn capture(&self, _ctx: &RunContext) -> Result<Box<dyn Undo>> {
        Ok(Box::new(FileSnapshot::capture(&self.target)?))
    }
}

#[derive(Debug)]
pub struct WriteStep {
    id: StepId,
    path: PathBuf,
    content: String,
    depends_on: Vec<StepId>,
}

impl WriteStep {
    /// Current contents, `None` when the file does not exist
    fn current(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }
}

impl Step for WriteStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.depends_on
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        Ok(match self.current()? {
            Some(current) if current == self.content => StepStatus::Satisfied,
            _ => StepStatus::NeedsApply,
        })
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        let path = self.path.display().to_string();
        Ok(match self.current()? {
            Some(current) => Diff::modify("file", path, Some(current), Some(self.content.clone())),
            None => Diff::add("file", path, Some(self.content.clone())),
        })
    }

    fn apply(&self, _ctx: &RunContext) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&self.path, &self.content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        log::info!("Wrote {}", self.path.display());
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let mut explanation = Explanation::new(format!("Write {}", self.path.display()))
            .with_tradeoff("Local edits to the file are overwritten on the next apply.");
        if ctx.verbose {
            explanation = explanation.with_detail(format!(
                "{} byte(s) of configured content",
                self.content.len()
            ));
        }
        explanation
    }

    fn resource_key(&self) -> String {
        self.path.display().to_string()
    }

    fn as_revertible(&self) -> Option<&dyn Revertible> {
        Some(self)
    }
}

impl Revertible for WriteStep {
    fn capture(&self, _ctx: &RunContext) -> Result<Box<dyn Undo>> {
        Ok(Box::new(FileSnapshot::capture(&self.path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{
        CompileOptions, Compiler, DiffType, Executor, NoProgress, Planner, RawConfig, ResultStatus,
        StepGraph,
    };
    use serde_json::json;
    use tempfile::TempDir;

    fn compile(root: &Path, config: serde_json::Value) -> StepGraph {
        Compiler::new()
            .with_provider(FilesProvider)
            .compile(
                &RawConfig::new(config),
                &CompileOptions::new().with_config_root(root),
            )
            .unwrap()
    }

    fn id(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    fn ctx(dir: &TempDir) -> RunContext {
        RunContext::new(dir.path())
    }

    #[test]
    fn test_ids_and_after() {
        let dir = TempDir::new().unwrap();
        let graph = compile(
            dir.path(),
            json!({"files": {
                "write": [{"path": "out/a.txt", "content": "a"}],
                "links": [{"source": "a", "target": "link-a", "after": ["file:write:out/a.txt"]}]
            }}),
        );
        assert_eq!(graph.order()[0], id("file:write:out/a.txt"));
        assert_eq!(
            graph.dependencies_of(&id("file:link:link-a")),
            vec![&id("file:write:out/a.txt")]
        );
    }

    #[test]
    fn test_after_unknown_step_fails_compile() {
        let err = Compiler::new()
            .with_provider(FilesProvider)
            .compile(
                &RawConfig::new(json!({"files": {"write": [
                    {"path": "a", "content": "", "after": ["brew:formula:zsh"]}
                ]}})),
                &CompileOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, declarative::Error::MissingDependency { .. }));
    }

    #[test]
    fn test_write_check_plan_apply() {
        let dir = TempDir::new().unwrap();
        let graph = compile(
            dir.path(),
            json!({"files": {"write": [{"path": "conf/app.toml", "content": "x = 2\n"}]}}),
        );
        let step = graph.get(&id("file:write:conf/app.toml")).unwrap();
        let ctx = ctx(&dir);

        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        assert_eq!(step.plan(&ctx).unwrap().diff_type(), DiffType::Add);

        fs::create_dir_all(dir.path().join("conf")).unwrap();
        fs::write(dir.path().join("conf/app.toml"), "x = 1\n").unwrap();
        let diff = step.plan(&ctx).unwrap();
        assert_eq!(diff.diff_type(), DiffType::Modify);
        assert_eq!(diff.old.as_deref(), Some("x = 1\n"));

        step.apply(&ctx).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("conf/app.toml")).unwrap(),
            "x = 2\n"
        );
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Satisfied);
    }

    #[test]
    fn test_paths_with_spaces_compile_and_apply() {
        let dir = TempDir::new().unwrap();
        let path = "Library/Application Support/Code/User/settings.json";
        let graph = compile(
            dir.path(),
            json!({"files": {
                "write": [{"path": path, "content": "{}\n"}],
                "links": [{"source": path, "target": "Code Settings.json"}]
            }}),
        );
        let write = graph.get(&id(&format!("file:write:{path}"))).unwrap();
        assert!(graph.contains(&id("file:link:Code Settings.json")));

        let ctx = ctx(&dir);
        fs::create_dir_all(dir.path().join("Library/Application Support/Code/User")).unwrap();
        write.apply(&ctx).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join(path)).unwrap(), "{}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_link_states() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zshrc"), "export A=1").unwrap();
        fs::write(dir.path().join("other"), "").unwrap();
        let graph = compile(
            dir.path(),
            json!({"files": {"links": [{"source": "zshrc", "target": "home/.zshrc"}]}}),
        );
        let step = graph.get(&id("file:link:home/.zshrc")).unwrap();
        let ctx = ctx(&dir);
        let target = dir.path().join("home/.zshrc");

        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        step.apply(&ctx).unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Satisfied);

        fs::remove_file(&target).unwrap();
        std::os::unix::fs::symlink(dir.path().join("other"), &target).unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        assert_eq!(step.plan(&ctx).unwrap().diff_type(), DiffType::Modify);
        step.apply(&ctx).unwrap();
        assert_eq!(fs::read_link(&target).unwrap(), dir.path().join("zshrc"));

        fs::remove_file(&target).unwrap();
        fs::write(&target, "mine").unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Skipped);
        assert!(step.apply(&ctx).is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "mine");
    }

    #[cfg(unix)]
    #[test]
    fn test_link_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let graph = compile(
            dir.path(),
            json!({"files": {"links": [{"source": "nope", "target": "x"}]}}),
        );
        let err = graph
            .get(&id("file:link:x"))
            .unwrap()
            .apply(&ctx(&dir))
            .unwrap_err();
        assert!(err.to_string().contains("Source does not exist"));
    }

    #[test]
    fn test_failed_run_rolls_back_writes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "original").unwrap();

        // The third write needs `new` to be a directory, but the second
        // write makes it a file
        let graph = compile(
            dir.path(),
            json!({"files": {"write": [
                {"path": "a.txt", "content": "changed"},
                {"path": "new", "content": "fresh", "after": ["file:write:a.txt"]},
                {"path": "new/inner.txt", "content": "x", "after": ["file:write:new"]}
            ]}}),
        );
        let ctx = ctx(&dir);
        let plan = Planner::new().plan(&graph, &ctx).unwrap();
        assert_eq!(plan.summary().needs_apply, 3);

        let report = Executor::new()
            .with_rollback_on_failure(true)
            .execute(&plan, &ctx, &mut NoProgress)
            .unwrap();

        assert!(report.has_failures());
        assert!(report.was_rolled_back());
        assert_eq!(
            report.get(&id("file:write:new/inner.txt")).unwrap().status,
            ResultStatus::Failed
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "original"
        );
        assert!(!dir.path().join("new").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let graph = compile(
            dir.path(),
            json!({"files": {"write": [{"path": "a.txt", "content": "a"}]}}),
        );
        let ctx = ctx(&dir).with_dry_run(true);
        let plan = Planner::new().plan(&graph, &ctx).unwrap();
        let report = Executor::new()
            .with_dry_run(true)
            .execute(&plan, &ctx, &mut NoProgress)
            .unwrap();
        assert_eq!(report.count(ResultStatus::DryRun), 1);
        assert!(!dir.path().join("a.txt").exists());
    }
}
