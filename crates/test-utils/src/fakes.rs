#![allow(dead_code)]

//! Fake collaborators for driving lifecycles and registries in tests.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;

use composite_build::dag::{ExecutionPlan, Node, SyntheticNode, Task, TaskPath, TaskRef};
use composite_build::engine::{
    BuildLifecycle, BuildLifecycleFactory, BuildServices, ExecutionResult,
};
use composite_build::errors::Result;
use composite_build::exec::{EngineHealth, WorkExecutor, WorkerLeases};
use composite_build::model::{
    BuildListener, BuildModel, BuildModelController, BuildResult, BuildSettings,
};
use composite_build::types::BuildIdentifier;

/// Shorthand for a task without dependencies.
pub fn task(build: &BuildIdentifier, name: &str) -> TaskRef {
    Task::new(build.clone(), name).into_ref()
}

/// A model controller with a fixed set of tasks.
pub struct FakeModelController {
    build: BuildIdentifier,
    tasks: BTreeMap<String, TaskRef>,
    requested: Vec<TaskRef>,
    seed_nodes: Vec<SyntheticNode>,
    fail_close: bool,
    fail_configuration: Option<String>,
    pub prepare_calls: Arc<AtomicUsize>,
    pub configure_calls: Arc<AtomicUsize>,
    pub close_calls: Arc<AtomicUsize>,
}

impl FakeModelController {
    pub fn new(build: BuildIdentifier) -> Self {
        Self {
            build,
            tasks: BTreeMap::new(),
            requested: Vec::new(),
            seed_nodes: Vec::new(),
            fail_close: false,
            fail_configuration: None,
            prepare_calls: Arc::new(AtomicUsize::new(0)),
            configure_calls: Arc::new(AtomicUsize::new(0)),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn build(&self) -> &BuildIdentifier {
        &self.build
    }

    pub fn with_task(mut self, task: TaskRef) -> Self {
        self.tasks.insert(task.name().to_string(), task);
        self
    }

    /// Add `task` and request it.
    pub fn requesting(mut self, task: TaskRef) -> Self {
        self.tasks.insert(task.name().to_string(), Arc::clone(&task));
        self.requested.push(task);
        self
    }

    /// Seed every new work graph with `node`.
    pub fn seeding(mut self, node: SyntheticNode) -> Self {
        self.seed_nodes.push(node);
        self
    }

    /// Make closing a work graph of this build fail.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_configuration(mut self, message: &str) -> Self {
        self.fail_configuration = Some(message.to_string());
        self
    }
}

impl BuildModelController for FakeModelController {
    fn loaded_settings(&self) -> anyhow::Result<Arc<BuildSettings>> {
        Ok(Arc::new(BuildSettings {
            build: self.build.clone(),
            included_builds: Vec::new(),
        }))
    }

    fn configured_model(&self) -> anyhow::Result<Arc<BuildModel>> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_configuration {
            return Err(anyhow!("{message}"));
        }
        Ok(Arc::new(BuildModel {
            build: self.build.clone(),
            tasks: self.tasks.clone(),
            requested: self.requested.clone(),
        }))
    }

    fn prepare_to_schedule_tasks(&self) -> anyhow::Result<()> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn initialize_work_graph(&self, plan: &mut ExecutionPlan) -> anyhow::Result<()> {
        if !self.seed_nodes.is_empty() {
            plan.add_nodes(self.seed_nodes.iter().cloned().map(Node::Synthetic).collect())?;
        }

        let close_calls = Arc::clone(&self.close_calls);
        let fail = self.fail_close;
        let build = self.build.clone();
        plan.add_close_hook(Box::new(move || {
            close_calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                return Err(io::Error::other(format!("cannot release {build}")));
            }
            Ok(())
        }));
        Ok(())
    }
}

/// Executor that completes every task node immediately, with optional
/// per-build delays and failures.
#[derive(Default)]
pub struct FakeExecutor {
    delays: HashMap<BuildIdentifier, Duration>,
    failures: HashMap<BuildIdentifier, String>,
    panics: Vec<BuildIdentifier>,
    started: Mutex<Vec<BuildIdentifier>>,
    completed: Mutex<Vec<BuildIdentifier>>,
    tasks: Mutex<Vec<TaskPath>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, build: BuildIdentifier, delay: Duration) -> Self {
        self.delays.insert(build, delay);
        self
    }

    pub fn failing(mut self, build: BuildIdentifier, message: &str) -> Self {
        self.failures.insert(build, message.to_string());
        self
    }

    pub fn panicking(mut self, build: BuildIdentifier) -> Self {
        self.panics.push(build);
        self
    }

    /// Builds in the order their execution started.
    pub fn started(&self) -> Vec<BuildIdentifier> {
        self.started.lock().unwrap().clone()
    }

    /// Builds in the order their execution completed.
    pub fn completed(&self) -> Vec<BuildIdentifier> {
        self.completed.lock().unwrap().clone()
    }

    /// Every task run so far, in order.
    pub fn tasks(&self) -> Vec<TaskPath> {
        self.tasks.lock().unwrap().clone()
    }
}

impl WorkExecutor for FakeExecutor {
    fn execute(&self, build: &BuildIdentifier, plan: &ExecutionPlan) -> ExecutionResult<()> {
        self.started.lock().unwrap().push(build.clone());
        if let Some(delay) = self.delays.get(build) {
            std::thread::sleep(*delay);
        }
        if self.panics.contains(build) {
            panic!("executor blew up for {build}");
        }

        for node in plan.execution_order() {
            if let Node::Task(task) = node {
                self.tasks.lock().unwrap().push(task.path().clone());
                plan.node_completed(node);
            }
        }

        self.completed.lock().unwrap().push(build.clone());
        match self.failures.get(build) {
            Some(message) => ExecutionResult::failed(anyhow!("{message}")),
            None => ExecutionResult::succeeded(),
        }
    }
}

/// Listener recording every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    results: Mutex<Vec<BuildResult>>,
    fail_with: Option<String>,
    panic_with: Option<String>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn panicking(message: &str) -> Self {
        Self {
            panic_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn results(&self) -> Vec<BuildResult> {
        self.results.lock().unwrap().clone()
    }
}

impl BuildListener for RecordingListener {
    fn build_finished(&self, result: &BuildResult) -> anyhow::Result<()> {
        self.results.lock().unwrap().push(result.clone());
        if let Some(message) = &self.panic_with {
            panic!("{message}");
        }
        match &self.fail_with {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// Lifecycle factory handing out fake models. Builds without a registered
/// model get an empty one.
pub struct FakeBuildFactory {
    executor: Arc<dyn WorkExecutor>,
    models: Mutex<HashMap<BuildIdentifier, FakeModelController>>,
    listener: Option<Arc<dyn BuildListener>>,
    created: Mutex<Vec<BuildIdentifier>>,
}

impl FakeBuildFactory {
    pub fn new(executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            executor,
            models: Mutex::new(HashMap::new()),
            listener: None,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(self, model: FakeModelController) -> Self {
        self.models
            .lock()
            .unwrap()
            .insert(model.build().clone(), model);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn BuildListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Builds in the order their lifecycles were created.
    pub fn created(&self) -> Vec<BuildIdentifier> {
        self.created.lock().unwrap().clone()
    }
}

impl BuildLifecycleFactory for FakeBuildFactory {
    fn create(&self, build: &BuildIdentifier) -> Result<BuildLifecycle> {
        self.created.lock().unwrap().push(build.clone());
        let model = self
            .models
            .lock()
            .unwrap()
            .remove(build)
            .unwrap_or_else(|| FakeModelController::new(build.clone()));

        let lifecycle = BuildLifecycle::new(
            build.clone(),
            BuildServices::new(Arc::new(model), Arc::clone(&self.executor)),
        );
        if let Some(listener) = &self.listener {
            lifecycle.add_listener(Arc::clone(listener));
        }
        Ok(lifecycle)
    }
}

/// Health check that reports a stall once it has been asked `healthy_checks`
/// times.
#[derive(Default)]
pub struct StallingHealth {
    healthy_checks: usize,
    checks: AtomicUsize,
}

impl StallingHealth {
    pub fn after(healthy_checks: usize) -> Self {
        Self {
            healthy_checks,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl EngineHealth for StallingHealth {
    fn assert_healthy(&self) -> anyhow::Result<()> {
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        if seen >= self.healthy_checks {
            return Err(anyhow!("no progress after {} checks", seen + 1));
        }
        Ok(())
    }
}

/// Worker leases counting releases and reacquisitions.
#[derive(Default)]
pub struct CountingLeases {
    pub released: AtomicUsize,
    pub reacquired: AtomicUsize,
}

impl WorkerLeases for CountingLeases {
    fn release_all(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn reacquire(&self) {
        self.reacquired.fetch_add(1, Ordering::SeqCst);
    }
}
