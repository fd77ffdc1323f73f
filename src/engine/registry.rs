// src/engine/registry.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::dag::TaskRef;
use crate::engine::controller::BuildController;
use crate::engine::latch::{self, Completion};
use crate::engine::lifecycle::BuildLifecycle;
use crate::engine::result::{ExecutionResult, Failure};
use crate::errors::{CompositeError, Result};
use crate::exec::{EngineHealth, NoWorkerLeases, ReleasedLeases, WorkerLeases};
use crate::types::BuildIdentifier;

const DEFAULT_MONITORING_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Creates the lifecycle of a build the first time the registry sees it.
pub trait BuildLifecycleFactory: Send + Sync {
    fn create(&self, build: &BuildIdentifier) -> Result<BuildLifecycle>;
}

/// Registry options shared by every invocation.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// How often the execution wait wakes up to check engine health.
    pub monitoring_poll_interval: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            monitoring_poll_interval: DEFAULT_MONITORING_POLL_INTERVAL,
        }
    }
}

/// Owns one [`BuildController`] per build and coordinates them.
///
/// Every operation spanning builds visits controllers in
/// [`BuildIdentifier`] order, so included builds come first (by name) and
/// the root build comes last, whatever order builds were discovered or
/// completed in.
pub struct BuildRegistry {
    controllers: Mutex<BTreeMap<BuildIdentifier, Arc<BuildController>>>,
    factory: Arc<dyn BuildLifecycleFactory>,
    health: Arc<dyn EngineHealth>,
    leases: Arc<dyn WorkerLeases>,
    options: RegistryOptions,
    executing: AtomicBool,
}

impl BuildRegistry {
    pub fn new(
        factory: Arc<dyn BuildLifecycleFactory>,
        health: Arc<dyn EngineHealth>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            controllers: Mutex::new(BTreeMap::new()),
            factory,
            health,
            leases: Arc::new(NoWorkerLeases),
            options,
            executing: AtomicBool::new(false),
        }
    }

    pub fn with_worker_leases(mut self, leases: Arc<dyn WorkerLeases>) -> Self {
        self.leases = leases;
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<BuildIdentifier, Arc<BuildController>>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The controller of `build`, created on first use.
    pub fn get_controller(&self, build: &BuildIdentifier) -> Result<Arc<BuildController>> {
        let mut controllers = self.lock();
        if let Some(controller) = controllers.get(build) {
            return Ok(Arc::clone(controller));
        }

        if self.executing.load(Ordering::Acquire) {
            return Err(CompositeError::IllegalPhase {
                owner: "build registry".to_string(),
                message: format!("cannot add {build} once execution has started"),
            });
        }

        let controller = Arc::new(BuildController::new(self.factory.create(build)?));
        debug!(build = %build, "created build controller");
        controllers.insert(build.clone(), Arc::clone(&controller));
        Ok(controller)
    }

    /// Snapshot of all controllers, in build order.
    pub fn controllers(&self) -> Vec<Arc<BuildController>> {
        self.lock().values().cloned().collect()
    }

    /// Build identifiers known so far, in build order.
    pub fn builds(&self) -> Vec<BuildIdentifier> {
        self.lock().keys().cloned().collect()
    }

    /// Queue `task` on the controller of the build that owns it.
    pub fn queue_task(&self, task: TaskRef) -> Result<()> {
        let controller = self.get_controller(task.build())?;
        controller.queue_for_execution(task);
        Ok(())
    }

    /// Schedule queued work until no build discovers anything new, then
    /// finalize every build's graph.
    ///
    /// Returns the number of passes it took.
    pub fn populate_work_graphs(&self) -> Result<usize> {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut discovered = false;

            for controller in self.controllers() {
                if controller.schedule_queued_tasks()? {
                    discovered = true;
                }
                for request in controller.take_cross_build_requests() {
                    debug!(
                        from = %controller.build(),
                        to = %request.build(),
                        task = %request.path(),
                        "routing cross-build request"
                    );
                    self.queue_task(request)?;
                    discovered = true;
                }
            }

            debug!(pass = passes, discovered, "population pass complete");
            if !discovered {
                break;
            }
        }

        let controllers = self.controllers();
        for controller in &controllers {
            controller.finalize_work_graph()?;
        }

        info!(passes, builds = controllers.len(), "work graphs populated");
        Ok(passes)
    }

    /// Execute every build concurrently and merge their results in build
    /// order.
    ///
    /// While waiting, worker leases are released and the engine's health is
    /// checked every poll interval.
    pub async fn execute(&self) -> Result<ExecutionResult<()>> {
        self.executing.store(true, Ordering::Release);

        let controllers = self.controllers();
        let results: Arc<Mutex<HashMap<BuildIdentifier, ExecutionResult<()>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (countdown, mut completion) = latch::countdown(controllers.len());

        info!(builds = controllers.len(), "starting build execution");
        for controller in &controllers {
            let controller = Arc::clone(controller);
            let results = Arc::clone(&results);
            let countdown = countdown.clone();

            tokio::spawn(async move {
                let build = controller.build().clone();
                let result = match tokio::task::spawn_blocking(move || controller.execute()).await
                {
                    Ok(result) => result,
                    Err(err) => ExecutionResult::failed(anyhow!("execution of {build} aborted: {err}")),
                };
                debug!(build = %build, failed = result.is_failed(), "build execution completed");
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(build, result);
                countdown.count_down();
            });
        }
        drop(countdown);

        self.await_completion(&mut completion).await?;

        let mut results = results.lock().unwrap_or_else(PoisonError::into_inner);
        let mut merged = ExecutionResult::succeeded();
        for controller in &controllers {
            if let Some(result) = results.remove(controller.build()) {
                merged = merged.with_failures(result);
            }
        }

        info!(failures = merged.failures().len(), "build execution complete");
        Ok(merged)
    }

    async fn await_completion(&self, completion: &mut Completion) -> Result<()> {
        let _released = ReleasedLeases::new(self.leases.as_ref());
        let poll = self.options.monitoring_poll_interval;

        loop {
            let waited = tokio::time::timeout(poll, completion.wait()).await;
            match waited {
                Ok(result) => return result,
                Err(_) => {
                    debug!(remaining = completion.remaining(), "still waiting for builds");
                    if let Err(err) = self.health.assert_healthy() {
                        warn!(error = %err, "engine unhealthy; abandoning wait");
                        return Err(CompositeError::UnhealthyEngine(err.to_string()));
                    }
                }
            }
        }
    }

    /// Finish every build and merge the results in build order.
    pub fn finish_builds(&self) -> Result<ExecutionResult<()>> {
        let mut merged = ExecutionResult::succeeded();
        for controller in self.controllers() {
            merged = merged.with_failures(controller.finish_build(None)?);
        }
        Ok(merged)
    }

    /// Stop every build. All builds are stopped even if some fail; the
    /// failures are reported together.
    pub fn close(&self) -> Result<()> {
        let controllers = std::mem::take(&mut *self.lock());

        let mut failures = Vec::new();
        for (build, controller) in controllers {
            if let Err(err) = controller.stop() {
                warn!(build = %build, error = %err, "failed to stop build");
                failures.push(Failure::new(err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CompositeError::StopFailures(failures))
        }
    }
}

impl fmt::Debug for BuildRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRegistry")
            .field("builds", &self.builds())
            .field("options", &self.options)
            .field("executing", &self.executing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
