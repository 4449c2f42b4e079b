//! Compiler - turns configuration sections into a validated step graph
//!
//! Each registered [`Provider`] reads its own section of the merged
//! configuration and returns steps. All steps go into a single
//! [`StepGraphBuilder`]; any provider error aborts the compile.

use crate::error::{Error, Result};
use crate::graph::{StepGraph, StepGraphBuilder};
use crate::resolution::{FloatingResolver, VersionResolver};
use crate::step::BoxedStep;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Merged configuration as seen by providers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawConfig {
    root: Value,
}

impl RawConfig {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Top-level section, if present and not null
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.root.get(name).filter(|v| !v.is_null())
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

impl From<Value> for RawConfig {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// A producer of steps for one configuration section
pub trait Provider: Send + Sync {
    /// Provider name, also the default section name and StepId prefix
    fn name(&self) -> &str;

    /// Translate configuration into steps
    ///
    /// Must not touch the system; returning an empty list when the section
    /// is absent is expected.
    fn compile(&self, ctx: &CompileContext<'_>) -> anyhow::Result<Vec<BoxedStep>>;
}

/// Options shared by every provider during a compile
#[derive(Clone)]
pub struct CompileOptions {
    config_root: PathBuf,
    target: String,
    resolver: Arc<dyn VersionResolver>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from("."),
            target: std::env::consts::OS.to_string(),
            resolver: Arc::new(FloatingResolver),
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn VersionResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("config_root", &self.config_root)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// What a provider can see while compiling
pub struct CompileContext<'a> {
    config: &'a RawConfig,
    options: &'a CompileOptions,
}

impl<'a> CompileContext<'a> {
    pub fn new(config: &'a RawConfig, options: &'a CompileOptions) -> Self {
        Self { config, options }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.config.section(name)
    }

    /// Decode a section into a typed config, defaulting when absent
    pub fn decode<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.section(name) {
            None => Ok(T::default()),
            Some(value) => {
                T::deserialize(value).map_err(|source| Error::Section {
                    section: name.to_string(),
                    source,
                })
            }
        }
    }

    pub fn config_root(&self) -> &Path {
        &self.options.config_root
    }

    /// Platform target, e.g. "macos" or "linux"
    pub fn target(&self) -> &str {
        &self.options.target
    }

    pub fn resolver(&self) -> &dyn VersionResolver {
        self.options.resolver.as_ref()
    }
}

/// Runs registered providers and assembles their steps into one graph
#[derive(Default)]
pub struct Compiler {
    providers: Vec<Box<dyn Provider>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; registration order is compile order
    pub fn register(&mut self, provider: impl Provider + 'static) -> &mut Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.register(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn compile(&self, config: &RawConfig, options: &CompileOptions) -> Result<StepGraph> {
        let ctx = CompileContext::new(config, options);
        let mut builder = StepGraphBuilder::new();

        for provider in &self.providers {
            let steps = provider.compile(&ctx).map_err(|source| Error::Provider {
                provider: provider.name().to_string(),
                source,
            })?;
            log::debug!("Provider '{}' produced {} step(s)", provider.name(), steps.len());
            for step in steps {
                builder.add(step)?;
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::Resolution;
    use crate::testing::TestStep;
    use serde::Deserialize;
    use serde_json::json;

    /// Provider whose section is a list of `[id, deps...]` arrays
    struct ListProvider(&'static str);

    impl Provider for ListProvider {
        fn name(&self) -> &str {
            self.0
        }

        fn compile(&self, ctx: &CompileContext<'_>) -> anyhow::Result<Vec<BoxedStep>> {
            let rows: Vec<Vec<String>> = ctx.decode(self.0)?;
            Ok(rows
                .iter()
                .map(|row| {
                    let deps: Vec<&str> = row[1..].iter().map(String::as_str).collect();
                    TestStep::new(&row[0], &deps).boxed()
                })
                .collect())
        }
    }

    struct FailingProvider;

    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "broken"
        }

        fn compile(&self, _ctx: &CompileContext<'_>) -> anyhow::Result<Vec<BoxedStep>> {
            anyhow::bail!("bad section")
        }
    }

    #[test]
    fn test_empty_config_compiles_to_empty_graph() {
        let compiler = Compiler::new().with_provider(ListProvider("a"));
        let graph = compiler
            .compile(&RawConfig::default(), &CompileOptions::default())
            .unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cross_provider_dependencies() {
        let config = RawConfig::new(json!({
            "a": [["a:x:app", "b:x:lib"]],
            "b": [["b:x:lib"]],
        }));
        let compiler = Compiler::new()
            .with_provider(ListProvider("a"))
            .with_provider(ListProvider("b"));
        let graph = compiler.compile(&config, &CompileOptions::default()).unwrap();

        let order: Vec<&str> = graph.order().iter().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["b:x:lib", "a:x:app"]);
        assert_eq!(compiler.provider_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_across_providers() {
        let config = RawConfig::new(json!({
            "a": [["a:x:same"]],
            "b": [["a:x:same"]],
        }));
        let compiler = Compiler::new()
            .with_provider(ListProvider("a"))
            .with_provider(ListProvider("b"));
        let err = compiler
            .compile(&config, &CompileOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateStep(_)));
    }

    #[test]
    fn test_provider_error_aborts_compile() {
        let config = RawConfig::new(json!({ "a": [["a:x:1"]] }));
        let compiler = Compiler::new()
            .with_provider(ListProvider("a"))
            .with_provider(FailingProvider);
        let err = compiler
            .compile(&config, &CompileOptions::default())
            .err()
            .unwrap();
        match err {
            Error::Provider { provider, source } => {
                assert_eq!(provider, "broken");
                assert_eq!(source.to_string(), "bad section");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_reports_section_name() {
        #[derive(Debug, Default, Deserialize)]
        struct Section {
            #[allow(dead_code)]
            names: Vec<String>,
        }

        let config = RawConfig::new(json!({ "s": { "names": 3 } }));
        let options = CompileOptions::default();
        let ctx = CompileContext::new(&config, &options);
        let err = ctx.decode::<Section>("s").unwrap_err();
        assert!(err.to_string().contains("'s'"));
        assert!(ctx.decode::<Section>("missing").is_ok());
    }

    #[test]
    fn test_context_exposes_options() {
        struct Pinned;
        impl VersionResolver for Pinned {
            fn resolve(&self, _p: &str, _n: &str, _l: Option<&str>) -> Resolution {
                Resolution::latest(Some("9.9"))
            }
        }

        let config = RawConfig::new(json!({ "x": null }));
        let options = CompileOptions::new()
            .with_config_root("/etc/keel")
            .with_target("macos")
            .with_resolver(Arc::new(Pinned));
        let ctx = CompileContext::new(&config, &options);

        assert!(ctx.section("x").is_none());
        assert_eq!(ctx.config_root(), Path::new("/etc/keel"));
        assert_eq!(ctx.target(), "macos");
        assert_eq!(
            ctx.resolver().resolve("brew", "git", None).version.as_deref(),
            Some("9.9")
        );
    }
}
