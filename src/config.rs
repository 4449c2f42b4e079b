//! Layered configuration
//!
//! Each file is parsed by extension (`.yaml`/`.yml`, `.toml`, `.json`) into a
//! JSON value, then merged in order: maps merge recursively, anything else in
//! a later file replaces the earlier value. Provider sections are handed to
//! the compiler untouched; the reserved sections below configure keel itself.

use anyhow::{Context, Result, bail};
use declarative::RawConfig;
use lockkit::Mode;
use policy::{OrgPolicy, Policy};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Top-level sections no provider may claim
pub const RESERVED_SECTIONS: [&str; 5] =
    ["lock", "policy", "org_policy", "policy_file", "org_policy_file"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some(other) => bail!(
                "Unsupported config format '.{other}' for {} (expected .yaml, .toml or .json)",
                path.display()
            ),
            None => bail!("Config file {} has no extension", path.display()),
        }
    }

    pub fn parse(self, content: &str) -> Result<Value> {
        let value = match self {
            Self::Yaml => serde_yaml::from_str::<Value>(content)?,
            Self::Toml => toml::from_str::<Value>(content)?,
            Self::Json => serde_json::from_str::<Value>(content)?,
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub mode: Option<Mode>,
}

/// Reserved sections, decoded
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lock: LockSettings,
    pub policy: Option<Policy>,
    pub org_policy: Option<OrgPolicy>,
    pub policy_file: Option<String>,
    pub org_policy_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Files in merge order; the first one anchors the lockfile
    pub files: Vec<PathBuf>,
    pub raw: RawConfig,
    pub settings: Settings,
}

impl LoadedConfig {
    pub fn primary(&self) -> &Path {
        &self.files[0]
    }

    /// Directory relative paths in the configuration resolve against
    pub fn root(&self) -> PathBuf {
        self.primary()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Inline policy merged with `policy_file`, if any
    pub fn policy(&self) -> Result<Option<Policy>> {
        let mut sources = Vec::new();
        if let Some(inline) = &self.settings.policy {
            sources.push(inline.clone());
        }
        if let Some(file) = &self.settings.policy_file {
            let path = paths::resolve(file, &self.root());
            sources.push(Policy::load(&path)?);
        }
        Ok((!sources.is_empty()).then(|| Policy::merge(&sources)))
    }

    /// Inline org policy merged with `org_policy_file`, if any
    pub fn org_policy(&self) -> Result<Option<OrgPolicy>> {
        let mut sources = Vec::new();
        if let Some(inline) = &self.settings.org_policy {
            sources.push(inline.clone());
        }
        if let Some(file) = &self.settings.org_policy_file {
            let path = paths::resolve(file, &self.root());
            sources.push(OrgPolicy::load(&path)?);
        }
        Ok((!sources.is_empty()).then(|| OrgPolicy::merge(&sources)))
    }
}

/// Load and merge `files`, or the default config file when empty.
pub fn load(files: &[PathBuf]) -> Result<LoadedConfig> {
    let files = if files.is_empty() {
        vec![paths::default_config_file()?]
    } else {
        files.iter().map(|f| paths::expand(&f.to_string_lossy())).collect()
    };

    let mut merged = Value::Object(serde_json::Map::new());
    for file in &files {
        let layer = load_file(file)?;
        merge(&mut merged, layer);
        log::debug!("Merged config layer {}", file.display());
    }

    let settings = decode_settings(&merged)?;
    Ok(LoadedConfig {
        files,
        raw: RawConfig::new(merged),
        settings,
    })
}

fn load_file(path: &Path) -> Result<Value> {
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let value = format
        .parse(&content)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    match value {
        Value::Object(_) => Ok(value),
        // A YAML document holding only comments parses as null
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        _ => bail!("Config {} must be a mapping at the top level", path.display()),
    }
}

fn decode_settings(merged: &Value) -> Result<Settings> {
    let mut reserved = serde_json::Map::new();
    for name in RESERVED_SECTIONS {
        if let Some(value) = merged.get(name).filter(|v| !v.is_null()) {
            reserved.insert(name.to_string(), value.clone());
        }
    }
    serde_json::from_value(Value::Object(reserved)).context("Invalid keel settings in config")
}

/// Deep-merge `layer` into `base`
pub fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}
