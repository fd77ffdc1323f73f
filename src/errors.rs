// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::engine::Failure;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A phase contract was violated. Always a programming error.
    #[error("Illegal phase for {owner}: {message}")]
    IllegalPhase { owner: String, message: String },

    #[error("Invalid work graph: {0}")]
    InvalidWorkGraph(String),

    #[error("Work graph of {actual} cannot be used by {expected}")]
    ForeignWorkGraph { expected: String, actual: String },

    #[error("Unknown build: {0}")]
    UnknownBuild(String),

    #[error("Execution engine is unhealthy: {0}")]
    UnhealthyEngine(String),

    #[error("Interrupted while waiting for builds to complete: {0}")]
    InterruptedWait(String),

    #[error("Failed to stop {} build(s): {}", .0.len(), join_failures(.0))]
    StopFailures(Vec<Failure>),

    /// An action run inside a phase transition failed; the same failure is
    /// kept by the phase guard for the build's final report.
    #[error(transparent)]
    Failed(Failure),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join_failures(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CompositeError>;
