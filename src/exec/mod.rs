// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the [`WorkExecutor`] trait the registry runs plans
//!   through, plus the [`EngineHealth`] and [`WorkerLeases`] seams of its
//!   wait loop.
//! - [`ordered`] contains [`OrderedWorkExecutor`], which runs a plan in
//!   topological order and shares task outcomes across builds.

pub mod backend;
pub mod ordered;

pub use backend::{
    AlwaysHealthy, EngineHealth, NoWorkerLeases, ReleasedLeases, WorkExecutor, WorkerLeases,
};
pub use ordered::{OrderedWorkExecutor, TaskAction, TaskOutcome, TaskOutcomes};
