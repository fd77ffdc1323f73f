// src/engine/mod.rs

//! Orchestration engine for composite builds.
//!
//! This module ties together:
//! - the per-build lifecycle ([`lifecycle`]) and the controller the registry
//!   drives it through ([`controller`])
//! - the registry that owns every build, runs the cross-build fixpoint and
//!   executes builds concurrently ([`registry`])
//! - the results and failures that flow out of all of it ([`result`])
//!
//! The countdown the registry waits on lives in [`latch`].

pub mod controller;
pub mod latch;
pub mod lifecycle;
pub mod registry;
pub mod result;

pub use controller::BuildController;
pub use lifecycle::{BuildLifecycle, BuildServices};
pub use registry::{BuildLifecycleFactory, BuildRegistry, RegistryOptions};
pub use result::{ExecutionResult, Failure};
