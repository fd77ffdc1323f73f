// src/types.rs

//! Small shared types used across the engine.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Identifies one build taking part in a composite invocation.
///
/// The derived ordering sorts included builds lexicographically by name and
/// places the root build after all of them. Every cross-build iteration in
/// the registry relies on this order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildIdentifier {
    /// A build included into the composite, keyed by its name.
    Included(String),
    /// The build the invocation was started from.
    Root,
}

impl BuildIdentifier {
    pub fn included(name: impl Into<String>) -> Self {
        BuildIdentifier::Included(name.into())
    }

    pub fn is_root(&self) -> bool {
        matches!(self, BuildIdentifier::Root)
    }

    /// Name of the build. The root build is always called `":"`.
    pub fn name(&self) -> &str {
        match self {
            BuildIdentifier::Included(name) => name,
            BuildIdentifier::Root => ":",
        }
    }
}

impl fmt::Display for BuildIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildIdentifier::Included(name) => write!(f, "build '{name}'"),
            BuildIdentifier::Root => write!(f, "root build"),
        }
    }
}

impl FromStr for BuildIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("build name must not be empty".to_string()),
            ":" => Ok(BuildIdentifier::Root),
            name => Ok(BuildIdentifier::Included(name.to_string())),
        }
    }
}

/// Log level accepted in `[config].log_level` and by [`crate::logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!(
                "invalid log level: {other} (expected error, warn, info, debug or trace)"
            )),
        }
    }
}
