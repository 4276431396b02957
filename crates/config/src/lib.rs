//! Configuration.
//!
//! Settings are merged from several layers, later layers winning:
//!
//! 1. Built-in defaults.
//! 2. `config.{toml,yaml,json}` in the platform configuration directory.
//! 3. An explicit file (`--config`), its format picked by extension.
//! 4. Environment variables prefixed `QUARRY_`, with `__` between nested
//!    keys (`QUARRY_RESOURCE__VERBOSE=true`).
//! 5. `key=value` overrides from the command line, whose values are parsed
//!    the same way environment values are.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::Value;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "QUARRY_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resource: ResourceConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Directories and archives to mount, in order; later ones shadow
    /// earlier ones.
    pub sources: Vec<PathBuf>,
    /// Regular expressions; matching paths are left out of the index.
    pub excludes: Vec<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub idle_seconds: f64,
    pub idle_frames: u64,
    /// When off, nothing is ever evicted by the per-frame update.
    pub evict: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { idle_seconds: 4.0, idle_frames: 8, evict: true }
    }
}

/// Platform configuration directory, e.g. `~/.config/quarry` on Linux.
pub fn default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quarry").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Split positional command-line tokens into sources and `key=value`
/// overrides.
pub fn split_arguments<S: AsRef<str>>(args: impl IntoIterator<Item = S>) -> (Vec<PathBuf>, Vec<String>) {
    let mut sources = Vec::new();
    let mut overrides = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        match arg.contains('=') {
            true => overrides.push(arg.to_string()),
            false => sources.push(PathBuf::from(arg)),
        }
    }
    (sources, overrides)
}

/// Builds a [`Config`] from every layer.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: Option<PathBuf>,
    file: Option<PathBuf>,
    overrides: Vec<String>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self { config_dir: default_config_dir(), file: None, overrides: Vec::new(), env: true }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where to look for `config.{toml,yaml,json}`; `None` skips that layer.
    #[must_use]
    pub fn config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config_dir = dir;
        self
    }

    #[must_use]
    pub fn file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }

    #[must_use]
    pub fn overrides<S: Into<String>>(mut self, overrides: impl IntoIterator<Item = S>) -> Self {
        self.overrides.extend(overrides.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, env: bool) -> Self {
        self.env = env;
        self
    }

    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = &self.config_dir {
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(file) = &self.file {
            figment = merge_file(figment, file)?;
        }
        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }
        for item in &self.overrides {
            let (key, value) = parse_override(item)?;
            figment = figment.merge(Serialized::default(&key, value));
        }
        Ok(figment)
    }

    pub fn load(&self) -> Result<Config> {
        let config: Config = self.figment()?.extract().map_err(|e| ErrorKind::Load(e.to_string()))?;
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }
}

fn merge_file(figment: Figment, file: &Path) -> Result<Figment> {
    if !file.is_file() {
        exn::bail!(ErrorKind::Load(format!("no such file: {}", file.display())));
    }
    let extension = file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(file)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
        Some("json") => figment.merge(Json::file(file)),
        _ => exn::bail!(ErrorKind::Load(format!("unsupported format: {}", file.display()))),
    })
}

fn parse_override(item: &str) -> Result<(String, Value)> {
    let Some((key, value)) = item.split_once('=') else {
        exn::bail!(ErrorKind::InvalidOverride(item.to_string()));
    };
    let key = key.trim();
    let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !key.split('.').all(valid) {
        exn::bail!(ErrorKind::InvalidOverride(item.to_string()));
    }
    let value = value.trim().parse::<Value>().unwrap_or_else(|never| match never {});
    Ok((key.to_ascii_lowercase(), value))
}
