// src/exec/ordered.rs

//! Default executor: runs a finalized plan one node at a time. Ready nodes
//! run in topological order; external placeholders are only waited on once
//! no local node is ready.
//!
//! Tasks are handed to a caller supplied [`TaskAction`]. Every outcome is
//! published on a shared [`TaskOutcomes`] board, which is how an external
//! placeholder in one build learns the result of the task its owning build
//! runs concurrently.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::dag::{ExecutionPlan, Node, NodeKey, Task, TaskPath};
use crate::engine::{ExecutionResult, Failure};
use crate::exec::backend::{EngineHealth, WorkExecutor};
use crate::types::BuildIdentifier;

/// Runs a single task.
pub type TaskAction = Arc<dyn Fn(&Task) -> anyhow::Result<()> + Send + Sync>;

const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    /// Not run because a dependency did not succeed.
    Skipped,
}

/// Outcomes of every task run so far, shared between builds.
#[derive(Default)]
pub struct TaskOutcomes {
    outcomes: Mutex<HashMap<TaskPath, TaskOutcome>>,
    changed: Condvar,
}

impl TaskOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskPath, TaskOutcome>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, path: TaskPath, outcome: TaskOutcome) {
        self.lock().insert(path, outcome);
        self.changed.notify_all();
    }

    pub fn get(&self, path: &TaskPath) -> Option<TaskOutcome> {
        self.lock().get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until an outcome for `path` is published or `timeout` elapses.
    pub fn wait_for(&self, path: &TaskPath, timeout: Duration) -> Option<TaskOutcome> {
        if self.wait_for_any(&[path], timeout) {
            self.get(path)
        } else {
            None
        }
    }

    /// Block until any of `paths` has an outcome. Returns `false` on timeout.
    pub fn wait_for_any(&self, paths: &[&TaskPath], timeout: Duration) -> bool {
        let outcomes = self.lock();
        let (outcomes, _) = self
            .changed
            .wait_timeout_while(outcomes, timeout, |outcomes| {
                !paths.iter().any(|path| outcomes.contains_key(*path))
            })
            .unwrap_or_else(PoisonError::into_inner);
        paths.iter().any(|path| outcomes.contains_key(*path))
    }
}

impl fmt::Debug for TaskOutcomes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOutcomes")
            .field("published", &self.len())
            .finish()
    }
}

struct Progress {
    running: usize,
    last: Instant,
}

pub struct OrderedWorkExecutor {
    action: TaskAction,
    outcomes: Arc<TaskOutcomes>,
    external_timeout: Duration,
    stall_timeout: Duration,
    progress: Mutex<Progress>,
}

impl OrderedWorkExecutor {
    pub fn new(action: impl Fn(&Task) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            action: Arc::new(action),
            outcomes: Arc::new(TaskOutcomes::new()),
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            progress: Mutex::new(Progress {
                running: 0,
                last: Instant::now(),
            }),
        }
    }

    /// Share an outcome board with other executors.
    pub fn with_outcomes(mut self, outcomes: Arc<TaskOutcomes>) -> Self {
        self.outcomes = outcomes;
        self
    }

    /// How long an external placeholder waits for its owning build.
    pub fn with_external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }

    /// How long running builds may go without completing a node before the
    /// executor reports itself unhealthy.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn outcomes(&self) -> Arc<TaskOutcomes> {
        Arc::clone(&self.outcomes)
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.progress().last = Instant::now();
    }

    fn run_task(&self, build: &BuildIdentifier, task: &Task) -> Result<(), Failure> {
        debug!(build = %build, task = %task.path(), "running task");
        match (self.action)(task) {
            Ok(()) => {
                self.outcomes
                    .publish(task.path().clone(), TaskOutcome::Succeeded);
                Ok(())
            }
            Err(err) => {
                warn!(build = %build, task = %task.path(), error = %err, "task failed");
                self.outcomes
                    .publish(task.path().clone(), TaskOutcome::Failed);
                Err(Failure::new(err.context(format!("task {} failed", task.path()))))
            }
        }
    }

    /// Run a local or synthetic node whose dependencies have all settled.
    fn run_node(
        &self,
        build: &BuildIdentifier,
        plan: &ExecutionPlan,
        node: &Node,
        deps_ok: bool,
        failures: &mut Vec<Failure>,
    ) -> bool {
        match node {
            // Externals are settled by `settle_externals`.
            Node::Synthetic(_) | Node::External(_) => deps_ok,
            Node::Task(task) if !deps_ok => {
                debug!(build = %build, task = %task.path(), "skipping task; dependency did not succeed");
                self.outcomes
                    .publish(task.path().clone(), TaskOutcome::Skipped);
                false
            }
            Node::Task(task) => {
                let result = self.run_task(build, task);
                plan.node_completed(node);
                match result {
                    Ok(()) => true,
                    Err(failure) => {
                        failures.push(failure);
                        false
                    }
                }
            }
        }
    }

    /// Block until at least one of the `waiting` external nodes has an
    /// outcome. Returns the settled positions with their success flag and
    /// removes them from `waiting`. On timeout every waiting node fails.
    fn settle_externals(
        &self,
        build: &BuildIdentifier,
        order: &[&Node],
        waiting: &mut BTreeSet<usize>,
        failures: &mut Vec<Failure>,
    ) -> Vec<(usize, bool)> {
        let tasks: Vec<(usize, &Task)> = waiting
            .iter()
            .filter_map(|&pos| match order[pos] {
                Node::External(task) => Some((pos, &**task)),
                _ => None,
            })
            .collect();
        let paths: Vec<&TaskPath> = tasks.iter().map(|(_, task)| task.path()).collect();
        debug!(build = %build, waiting = paths.len(), "no local work ready; waiting for other builds");

        if !self.outcomes.wait_for_any(&paths, self.external_timeout) {
            waiting.clear();
            return tasks
                .into_iter()
                .map(|(pos, task)| {
                    failures.push(Failure::new(anyhow!(
                        "timed out after {:?} waiting for task {} of {}",
                        self.external_timeout,
                        task.path(),
                        task.build()
                    )));
                    (pos, false)
                })
                .collect();
        }

        tasks
            .into_iter()
            .filter_map(|(pos, task)| {
                let outcome = self.outcomes.get(task.path())?;
                waiting.remove(&pos);
                // The owning build reports its own failures.
                Some((pos, outcome == TaskOutcome::Succeeded))
            })
            .collect()
    }
}

impl WorkExecutor for OrderedWorkExecutor {
    /// Runs every ready local node before blocking on another build, so
    /// builds that depend on each other in both directions make progress.
    fn execute(&self, build: &BuildIdentifier, plan: &ExecutionPlan) -> ExecutionResult<()> {
        {
            let mut progress = self.progress();
            progress.running += 1;
            progress.last = Instant::now();
        }

        let order = plan.execution_order();
        let position: HashMap<NodeKey, usize> = order
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.key(), pos))
            .collect();

        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(order.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
        for (pos, node) in order.iter().enumerate() {
            let deps: Vec<usize> = plan
                .dependencies_of(&node.key())
                .iter()
                .filter_map(|dep| position.get(dep).copied())
                .collect();
            for &dep in &deps {
                dependents[dep].push(pos);
            }
            dependencies.push(deps);
        }
        let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();

        // Positions in topological order keep runs deterministic.
        let mut ready_local = BTreeSet::new();
        let mut ready_external = BTreeSet::new();
        let enqueue = |pos: usize, local: &mut BTreeSet<usize>, external: &mut BTreeSet<usize>| {
            if matches!(order[pos], Node::External(_)) {
                external.insert(pos);
            } else {
                local.insert(pos);
            }
        };
        for pos in (0..order.len()).filter(|&pos| pending[pos] == 0) {
            enqueue(pos, &mut ready_local, &mut ready_external);
        }

        let mut succeeded = vec![false; order.len()];
        let mut failures = Vec::new();
        let mut ran = 0usize;

        loop {
            let settled = if let Some(pos) = ready_local.pop_first() {
                let deps_ok = dependencies[pos].iter().all(|&dep| succeeded[dep]);
                if deps_ok && matches!(order[pos], Node::Task(_)) {
                    ran += 1;
                }
                vec![(pos, self.run_node(build, plan, order[pos], deps_ok, &mut failures))]
            } else if !ready_external.is_empty() {
                self.settle_externals(build, &order, &mut ready_external, &mut failures)
            } else {
                break;
            };

            for (pos, ok) in settled {
                succeeded[pos] = ok;
                for &dependent in &dependents[pos] {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        enqueue(dependent, &mut ready_local, &mut ready_external);
                    }
                }
            }
            self.touch();
        }

        {
            let mut progress = self.progress();
            progress.running = progress.running.saturating_sub(1);
            progress.last = Instant::now();
        }

        info!(
            build = %build,
            tasks = ran,
            failures = failures.len(),
            "build execution finished"
        );
        ExecutionResult::maybe_failed(failures)
    }
}

impl EngineHealth for OrderedWorkExecutor {
    fn assert_healthy(&self) -> anyhow::Result<()> {
        let progress = self.progress();
        let idle = progress.last.elapsed();
        if progress.running > 0 && idle > self.stall_timeout {
            return Err(anyhow!(
                "{} build(s) running but no work completed for {:?}",
                progress.running,
                idle
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for OrderedWorkExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedWorkExecutor")
            .field("outcomes", &self.outcomes)
            .field("external_timeout", &self.external_timeout)
            .field("stall_timeout", &self.stall_timeout)
            .finish_non_exhaustive()
    }
}
