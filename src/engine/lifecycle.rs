// src/engine/lifecycle.rs

//! Lifecycle of a single build.
//!
//! A [`BuildLifecycle`] drives one build through its phases
//! (see [`BuildPhase`]) and is the only way to create, populate, finalize and
//! run the build's [`WorkGraph`]. Every operation goes through the build's
//! [`PhaseGuard`], so concurrent callers are serialized and out-of-order
//! calls fail with [`CompositeError::IllegalPhase`].
//!
//! Configuration itself is delegated to a [`BuildModelController`]; the
//! lifecycle only makes sure nobody asks for it once the build finished.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::dag::{ExecutionPlan, Node, TaskRef, WorkGraph, WorkGraphBuilder};
use crate::engine::result::{ExecutionResult, Failure};
use crate::errors::{CompositeError, Result};
use crate::exec::WorkExecutor;
use crate::model::{
    BuildAction, BuildListener, BuildModel, BuildModelController, BuildResult, BuildSettings,
    DefaultFailureAnalyser, FailureAnalyser, ListenerRegistry,
};
use crate::phase::{BuildPhase, PhaseGuard};
use crate::types::BuildIdentifier;

static NEXT_LIFECYCLE_ID: AtomicU64 = AtomicU64::new(1);

/// Collaborators one build lifecycle works with.
#[derive(Clone)]
pub struct BuildServices {
    pub model: Arc<dyn BuildModelController>,
    pub executor: Arc<dyn WorkExecutor>,
    pub analyser: Arc<dyn FailureAnalyser>,
}

impl BuildServices {
    pub fn new(model: Arc<dyn BuildModelController>, executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            model,
            executor,
            analyser: Arc::new(DefaultFailureAnalyser),
        }
    }

    pub fn with_analyser(mut self, analyser: Arc<dyn FailureAnalyser>) -> Self {
        self.analyser = analyser;
        self
    }
}

pub struct BuildLifecycle {
    id: u64,
    build: BuildIdentifier,
    guard: PhaseGuard<BuildPhase>,
    services: BuildServices,
    listeners: ListenerRegistry,
    /// Set once tasks were scheduled; decides the "Build"/"Configure" label.
    has_tasks: AtomicBool,
}

impl BuildLifecycle {
    pub fn new(build: BuildIdentifier, services: BuildServices) -> Self {
        let owner = format!("state of {build}");
        Self {
            id: NEXT_LIFECYCLE_ID.fetch_add(1, Ordering::Relaxed),
            build,
            guard: PhaseGuard::new(owner, BuildPhase::Configure),
            services,
            listeners: ListenerRegistry::default(),
            has_tasks: AtomicBool::new(false),
        }
    }

    pub fn build(&self) -> &BuildIdentifier {
        &self.build
    }

    pub fn phase(&self) -> BuildPhase {
        self.guard.current()
    }

    /// Failures recorded by this build's transitions so far.
    pub fn failures(&self) -> Vec<Failure> {
        self.guard.failures()
    }

    pub fn load_settings(&self) -> Result<Arc<BuildSettings>> {
        let settings = self
            .guard
            .not_in_state(BuildPhase::Finished, || self.services.model.loaded_settings())??;
        Ok(settings)
    }

    pub fn with_settings<T>(&self, action: impl FnOnce(&BuildSettings) -> T) -> Result<T> {
        let value = self.guard.not_in_state(BuildPhase::Finished, || {
            let settings = self.services.model.loaded_settings()?;
            anyhow::Ok(action(&settings))
        })??;
        Ok(value)
    }

    pub fn configure_projects(&self) -> Result<()> {
        self.guard
            .not_in_state(BuildPhase::Finished, || self.services.model.configured_model())??;
        Ok(())
    }

    pub fn with_projects_configured<T>(&self, action: impl FnOnce(&BuildModel) -> T) -> Result<T> {
        let value = self.guard.not_in_state(BuildPhase::Finished, || {
            let model = self.services.model.configured_model()?;
            anyhow::Ok(action(&model))
        })??;
        Ok(value)
    }

    /// The configured model. Unlike the other queries this may be called from
    /// inside another guarded operation on the same thread, e.g. while
    /// populating the work graph.
    pub fn configured_build(&self) -> Result<Arc<BuildModel>> {
        let model = self
            .guard
            .not_in_state_ignore_other_threads(BuildPhase::Finished, || {
                self.services.model.configured_model()
            })??;
        Ok(model)
    }

    /// Enter the scheduling phase. Calling it again in the same round is a
    /// no-op.
    pub fn prepare_to_schedule_tasks(&self) -> Result<()> {
        self.guard
            .maybe_transition(BuildPhase::Configure, BuildPhase::TaskSchedule, || {
                self.has_tasks.store(true, Ordering::Release);
                debug!(build = %self.build, "preparing to schedule tasks");
                self.services.model.prepare_to_schedule_tasks()
            })
    }

    /// Create a fresh work graph for this round, seeded by the model
    /// controller.
    pub fn new_work_graph(&self) -> Result<WorkGraph> {
        self.guard.in_state(BuildPhase::TaskSchedule, || -> Result<WorkGraph> {
            let mut plan = ExecutionPlan::new(self.build.clone());
            self.services.model.initialize_work_graph(&mut plan)?;
            Ok(WorkGraph::new(self.id, plan))
        })?
    }

    /// Run `populate` against `graph`. May be called several times before
    /// the graph is finalized.
    pub fn populate_work_graph<F>(&self, graph: &mut WorkGraph, populate: F) -> Result<()>
    where
        F: FnOnce(&mut dyn WorkGraphBuilder) -> Result<()>,
    {
        self.check_owner(graph)?;
        self.guard.in_state(BuildPhase::TaskSchedule, || {
            let mut builder = LifecycleGraphBuilder {
                model: self.services.model.as_ref(),
                plan: graph.plan_mut(),
            };
            populate(&mut builder)
        })?
    }

    /// Freeze `graph`. A graph that fails to finalize keeps the build in
    /// [`BuildPhase::TaskSchedule`].
    pub fn finalize_work_graph(&self, graph: &mut WorkGraph) -> Result<()> {
        self.check_owner(graph)?;
        self.guard
            .transition(BuildPhase::TaskSchedule, BuildPhase::ReadyToRun, || {
                graph.register_handlers();
                graph.plan_mut().finalize()
            })
    }

    /// Run the finalized graph. Failures of the run are part of the returned
    /// result and do not prevent the build from returning to
    /// [`BuildPhase::Configure`].
    pub fn execute_tasks(&self, graph: &WorkGraph) -> Result<ExecutionResult<()>> {
        self.check_owner(graph)?;
        self.guard
            .try_transition(BuildPhase::ReadyToRun, BuildPhase::Configure, || {
                info!(build = %self.build, nodes = graph.plan().len(), "executing work graph");
                self.services.executor.execute(&self.build, graph.plan())
            })
    }

    /// Finish the build and notify listeners. Only a second call fails; every
    /// other problem is part of the returned result.
    pub fn finish_build(&self, failure: Option<Failure>) -> Result<ExecutionResult<()>> {
        self.guard.finish(BuildPhase::Finished, |stage| {
            let reported = failure.or_else(|| match stage {
                ExecutionResult::Failed(failures) => Some(self.services.analyser.transform(failures)),
                ExecutionResult::Succeeded(()) => None,
            });
            let action = if self.has_tasks.load(Ordering::Acquire) {
                BuildAction::RanTasks
            } else {
                BuildAction::ConfigurationOnly
            };
            let result = BuildResult {
                action,
                build: self.build.clone(),
                failure: reported,
            };

            info!(
                build = %self.build,
                action = result.label(),
                failed = result.failure.is_some(),
                "build finished"
            );

            match panic::catch_unwind(AssertUnwindSafe(|| self.listeners.build_finished(&result))) {
                Ok(Ok(())) => ExecutionResult::succeeded(),
                Ok(Err(err)) => ExecutionResult::failed(err),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(build = %self.build, panic = %message, "build listener panicked");
                    ExecutionResult::failed(anyhow!("build listener panicked: {message}"))
                }
            }
        })
    }

    /// Register a listener for the "build finished" notification. Returns
    /// `false` if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn BuildListener>) -> bool {
        self.listeners.add(listener)
    }

    fn check_owner(&self, graph: &WorkGraph) -> Result<()> {
        if graph.owner() != self.id {
            return Err(CompositeError::ForeignWorkGraph {
                expected: self.build.to_string(),
                actual: graph.build().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for BuildLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLifecycle")
            .field("id", &self.id)
            .field("build", &self.build)
            .field("guard", &self.guard)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

struct LifecycleGraphBuilder<'a> {
    model: &'a dyn BuildModelController,
    plan: &'a mut ExecutionPlan,
}

impl WorkGraphBuilder for LifecycleGraphBuilder<'_> {
    fn add_requested_tasks(&mut self) -> Result<()> {
        self.model.schedule_requested_tasks(self.plan)?;
        Ok(())
    }

    fn add_entry_tasks(&mut self, tasks: &[TaskRef]) -> Result<()> {
        for task in tasks {
            self.plan.add_entry_task(task)?;
        }
        Ok(())
    }

    fn add_nodes(&mut self, nodes: Vec<Node>) -> Result<()> {
        self.plan.add_nodes(nodes)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
