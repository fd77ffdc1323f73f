// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::RegistryOptions;
use crate::types::{BuildIdentifier, LogLevel};

/// Top-level composite description as read from a TOML file.
///
/// ```toml
/// [config]
/// monitoring_poll_interval = "10s"
/// log_level = "info"
///
/// [build.app]
/// root = true
/// requested = ["assemble"]
///
/// [build.app.task.assemble]
/// after = ["compile", "lib:jar"]
///
/// [build.app.task.compile]
///
/// [build.lib.task.jar]
/// ```
///
/// Nothing here is validated yet; see [`CompositeConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawCompositeConfig {
    /// Engine settings from `[config]`.
    #[serde(default)]
    pub config: EngineSection,

    /// All builds from `[build.<name>]`, keyed by build name.
    #[serde(default)]
    pub build: BTreeMap<String, BuildConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Duration string (`"500ms"`, `"10s"`, `"1m"`, `"1h"`) between engine
    /// health checks while waiting for builds.
    #[serde(default = "default_monitoring_poll_interval")]
    pub monitoring_poll_interval: String,

    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

fn default_monitoring_poll_interval() -> String {
    "10s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            monitoring_poll_interval: default_monitoring_poll_interval(),
            log_level: None,
        }
    }
}

/// `[build.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildConfig {
    /// Marks the build the invocation starts from. Exactly one build must
    /// set this.
    #[serde(default)]
    pub root: bool,

    /// Tasks requested for this build when the invocation starts.
    #[serde(default)]
    pub requested: Vec<String>,

    /// Tasks from `[build.<name>.task.<task>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[build.<name>.task.<task>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Tasks this one runs after. `"task"` refers to a task of the same
    /// build, `"build:task"` to a task of another build.
    #[serde(default)]
    pub after: Vec<String>,
}

/// Split a task reference into `(build, task)`, defaulting the build to
/// `current_build`.
pub fn split_task_ref<'a>(current_build: &'a str, reference: &'a str) -> (&'a str, &'a str) {
    match reference.split_once(':') {
        Some((build, task)) => (build, task),
        None => (current_build, reference),
    }
}

/// A validated composite description.
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    engine: EngineSection,
    monitoring_poll_interval: Duration,
    builds: BTreeMap<String, BuildConfig>,
    /// Name of the `[build.<name>]` section marked `root = true`.
    root: String,
}

impl CompositeConfig {
    /// Construct without validation. Only [`TryFrom<RawCompositeConfig>`]
    /// should call this.
    pub(crate) fn new_unchecked(
        engine: EngineSection,
        monitoring_poll_interval: Duration,
        builds: BTreeMap<String, BuildConfig>,
        root: String,
    ) -> Self {
        Self {
            engine,
            monitoring_poll_interval,
            builds,
            root,
        }
    }

    pub fn builds(&self) -> &BTreeMap<String, BuildConfig> {
        &self.builds
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.engine.log_level
    }

    pub fn monitoring_poll_interval(&self) -> Duration {
        self.monitoring_poll_interval
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            monitoring_poll_interval: self.monitoring_poll_interval,
        }
    }

    /// Identifier of the build configured under `name`.
    pub fn identifier_of(&self, name: &str) -> BuildIdentifier {
        if name == self.root {
            BuildIdentifier::Root
        } else {
            BuildIdentifier::included(name)
        }
    }

    /// Name of the `[build.<name>]` section behind `build`.
    pub fn name_of<'a>(&'a self, build: &'a BuildIdentifier) -> &'a str {
        match build {
            BuildIdentifier::Root => &self.root,
            BuildIdentifier::Included(name) => name,
        }
    }

    pub fn build_config(&self, build: &BuildIdentifier) -> Option<&BuildConfig> {
        match build {
            BuildIdentifier::Root => self.builds.get(&self.root),
            BuildIdentifier::Included(name) if *name == self.root => None,
            BuildIdentifier::Included(name) => self.builds.get(name),
        }
    }

    /// Every configured build, in build order.
    pub fn identifiers(&self) -> Vec<BuildIdentifier> {
        let mut ids: Vec<_> = self.builds.keys().map(|name| self.identifier_of(name)).collect();
        ids.sort();
        ids
    }
}

/// Parse a duration string such as `"250ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
