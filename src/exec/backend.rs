// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The registry talks to a [`WorkExecutor`] instead of running tasks itself.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! default implementation in [`super::ordered`].
//!
//! Two more seams live here because the registry's wait loop needs them:
//!
//! - [`EngineHealth`] is asked, on every poll timeout, whether the engine is
//!   still making progress.
//! - [`WorkerLeases`] are released while the invoking task blocks and taken
//!   back once it resumes.

use crate::dag::ExecutionPlan;
use crate::engine::ExecutionResult;
use crate::types::BuildIdentifier;

/// Runs the finalized plan of one build.
///
/// Called from Tokio's blocking pool, so implementations are free to block.
pub trait WorkExecutor: Send + Sync {
    fn execute(&self, build: &BuildIdentifier, plan: &ExecutionPlan) -> ExecutionResult<()>;
}

impl<F> WorkExecutor for F
where
    F: Fn(&BuildIdentifier, &ExecutionPlan) -> ExecutionResult<()> + Send + Sync,
{
    fn execute(&self, build: &BuildIdentifier, plan: &ExecutionPlan) -> ExecutionResult<()> {
        self(build, plan)
    }
}

/// Liveness check consulted while waiting for builds to finish.
pub trait EngineHealth: Send + Sync {
    /// Return an error describing the stall if the engine stopped
    /// progressing.
    fn assert_healthy(&self) -> anyhow::Result<()>;
}

/// Health check that never reports a stall.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

impl EngineHealth for AlwaysHealthy {
    fn assert_healthy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Coordination resources held by the invoking task.
pub trait WorkerLeases: Send + Sync {
    fn release_all(&self);
    fn reacquire(&self);
}

/// No leases to release.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWorkerLeases;

impl WorkerLeases for NoWorkerLeases {
    fn release_all(&self) {}
    fn reacquire(&self) {}
}

/// Leases released for as long as this value lives.
pub struct ReleasedLeases<'a> {
    leases: &'a dyn WorkerLeases,
}

impl<'a> ReleasedLeases<'a> {
    pub fn new(leases: &'a dyn WorkerLeases) -> Self {
        leases.release_all();
        Self { leases }
    }
}

impl Drop for ReleasedLeases<'_> {
    fn drop(&mut self) {
        self.leases.reacquire();
    }
}
