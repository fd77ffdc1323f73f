// src/dag/work_graph.rs

//! The work graph handed out by a build lifecycle.
//!
//! A [`WorkGraph`] wraps the build's [`ExecutionPlan`] together with the
//! completion handlers registered before finalization. Population goes
//! through the narrow [`WorkGraphBuilder`] trait so that callers cannot touch
//! the plan outside the scheduling phase.

use std::fmt;

use crate::dag::node::{Node, Task, TaskRef};
use crate::dag::plan::{CompletionHandler, ExecutionPlan};
use crate::errors::{CompositeError, Result};
use crate::types::BuildIdentifier;

/// Capability given to population callbacks.
pub trait WorkGraphBuilder {
    /// Add whatever tasks were originally requested for this build.
    fn add_requested_tasks(&mut self) -> Result<()>;

    /// Add each task as an independent root, one at a time.
    fn add_entry_tasks(&mut self, tasks: &[TaskRef]) -> Result<()>;

    /// Add non-task nodes such as synthetic barriers.
    fn add_nodes(&mut self, nodes: Vec<Node>) -> Result<()>;
}

pub struct WorkGraph {
    /// Identity of the lifecycle that created this graph.
    owner: u64,
    plan: ExecutionPlan,
    handlers: Vec<CompletionHandler>,
    closed: bool,
}

impl WorkGraph {
    pub(crate) fn new(owner: u64, plan: ExecutionPlan) -> Self {
        Self {
            owner,
            plan,
            handlers: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    pub(crate) fn plan_mut(&mut self) -> &mut ExecutionPlan {
        &mut self.plan
    }

    /// Move the handlers recorded so far onto the plan.
    pub(crate) fn register_handlers(&mut self) {
        for handler in self.handlers.drain(..) {
            self.plan.on_complete(handler);
        }
    }

    pub fn build(&self) -> &BuildIdentifier {
        self.plan.build()
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn is_finalized(&self) -> bool {
        self.plan.is_finalized()
    }

    /// Register a callback run for every completed task. Only legal before
    /// the graph is finalized.
    pub fn on_complete(&mut self, handler: impl Fn(&Task) + Send + Sync + 'static) -> Result<()> {
        if self.plan.is_finalized() {
            return Err(CompositeError::IllegalPhase {
                owner: format!("work graph of {}", self.plan.build()),
                message: "completion handlers must be registered before finalize".to_string(),
            });
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    /// Drain the tasks of other builds this graph depends on.
    pub fn take_cross_build_requests(&mut self) -> Vec<TaskRef> {
        self.plan.take_cross_build_requests()
    }

    /// Release the graph's resources. Further calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.handlers.clear();
        self.plan.close().map_err(CompositeError::from)
    }
}

impl fmt::Debug for WorkGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGraph")
            .field("owner", &self.owner)
            .field("plan", &self.plan)
            .field("pending_handlers", &self.handlers.len())
            .field("closed", &self.closed)
            .finish()
    }
}
