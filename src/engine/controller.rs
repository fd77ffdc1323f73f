// src/engine/controller.rs

//! Per-build handle used by the registry.
//!
//! A [`BuildController`] owns the build's current [`WorkGraph`] and the
//! queue of tasks other builds asked for. Tasks are scheduled at most once
//! per round; a finalized graph is replaced by a fresh one when the next
//! round starts.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::dag::{TaskPath, TaskRef, WorkGraph, WorkGraphBuilder};
use crate::engine::lifecycle::BuildLifecycle;
use crate::engine::result::{ExecutionResult, Failure};
use crate::errors::{CompositeError, Result};
use crate::types::BuildIdentifier;

pub struct BuildController {
    lifecycle: Arc<BuildLifecycle>,
    state: Mutex<ControllerState>,
}

#[derive(Default)]
struct ControllerState {
    graph: Option<WorkGraph>,
    queued: Vec<TaskRef>,
    /// Tasks already added to the current graph.
    scheduled: HashSet<TaskPath>,
}

impl BuildController {
    pub fn new(lifecycle: BuildLifecycle) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn build(&self) -> &BuildIdentifier {
        self.lifecycle.build()
    }

    pub fn lifecycle(&self) -> &Arc<BuildLifecycle> {
        &self.lifecycle
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a task to be added on the next scheduling pass.
    pub fn queue_for_execution(&self, task: TaskRef) {
        debug!(build = %self.build(), task = %task.path(), "queued task");
        self.lock().queued.push(task);
    }

    /// Number of queued tasks not yet drained.
    pub fn queued_len(&self) -> usize {
        self.lock().queued.len()
    }

    /// Populate the current graph directly.
    pub fn populate_work_graph<F>(&self, populate: F) -> Result<()>
    where
        F: FnOnce(&mut dyn WorkGraphBuilder) -> Result<()>,
    {
        let mut state = self.lock();
        self.ensure_graph(&mut state)?;
        let graph = self.graph_mut(&mut state)?;
        self.lifecycle.populate_work_graph(graph, populate)
    }

    /// Add every queued task that is not scheduled yet. Returns whether
    /// anything new was added.
    pub fn schedule_queued_tasks(&self) -> Result<bool> {
        let mut guard = self.lock();
        if guard.queued.is_empty() {
            return Ok(false);
        }
        self.ensure_graph(&mut guard)?;

        let state = &mut *guard;
        let mut fresh = Vec::with_capacity(state.queued.len());
        for task in state.queued.drain(..) {
            if state.scheduled.insert(task.path().clone()) {
                fresh.push(task);
            }
        }
        if fresh.is_empty() {
            return Ok(false);
        }

        debug!(build = %self.build(), tasks = fresh.len(), "scheduling queued tasks");
        let graph = self.graph_mut(state)?;
        self.lifecycle
            .populate_work_graph(graph, |builder| builder.add_entry_tasks(&fresh))?;
        Ok(true)
    }

    /// Drain the tasks of other builds the current graph depends on.
    pub fn take_cross_build_requests(&self) -> Vec<TaskRef> {
        self.lock()
            .graph
            .as_mut()
            .map(WorkGraph::take_cross_build_requests)
            .unwrap_or_default()
    }

    pub fn finalize_work_graph(&self) -> Result<()> {
        let mut state = self.lock();
        self.ensure_graph(&mut state)?;
        let graph = self.graph_mut(&mut state)?;
        self.lifecycle.finalize_work_graph(graph)
    }

    /// Run the finalized graph. Never fails; problems are reported in the
    /// result.
    pub fn execute(&self) -> ExecutionResult<()> {
        let state = self.lock();
        let Some(graph) = state.graph.as_ref().filter(|g| g.is_finalized()) else {
            return ExecutionResult::failed(CompositeError::IllegalPhase {
                owner: format!("state of {}", self.build()),
                message: "no finalized work graph to execute".to_string(),
            });
        };
        match self.lifecycle.execute_tasks(graph) {
            Ok(result) => result,
            Err(err) => ExecutionResult::failed(err),
        }
    }

    pub fn finish_build(&self, failure: Option<Failure>) -> Result<ExecutionResult<()>> {
        self.lifecycle.finish_build(failure)
    }

    /// Release the current graph.
    pub fn stop(&self) -> Result<()> {
        let graph = self.lock().graph.take();
        match graph {
            Some(mut graph) => graph.close(),
            None => Ok(()),
        }
    }

    /// Make sure there is a graph for the current round, creating it (and
    /// entering the scheduling phase) when there is none or the last one
    /// already ran.
    fn ensure_graph(&self, state: &mut ControllerState) -> Result<()> {
        if state.graph.as_ref().is_some_and(|graph| !graph.is_finalized()) {
            return Ok(());
        }
        self.lifecycle.prepare_to_schedule_tasks()?;
        if let Some(mut previous) = state.graph.take() {
            previous.close()?;
        }
        state.graph = Some(self.lifecycle.new_work_graph()?);
        state.scheduled.clear();
        Ok(())
    }

    fn graph_mut<'a>(&self, state: &'a mut ControllerState) -> Result<&'a mut WorkGraph> {
        state.graph.as_mut().ok_or_else(|| CompositeError::IllegalPhase {
            owner: format!("state of {}", self.build()),
            message: "work graph unavailable".to_string(),
        })
    }
}

impl fmt::Debug for BuildController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The state lock is held for the whole of an execution.
        f.debug_struct("BuildController")
            .field("build", self.build())
            .field("phase", &self.lifecycle.phase())
            .finish_non_exhaustive()
    }
}
