// src/model/configured.rs

//! Build collaborators backed by a validated [`CompositeConfig`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, bail};
use tracing::debug;

use crate::config::{CompositeConfig, split_task_ref};
use crate::dag::{Task, TaskRef};
use crate::engine::{BuildLifecycle, BuildLifecycleFactory, BuildServices};
use crate::errors::{CompositeError, Result};
use crate::exec::WorkExecutor;
use crate::model::{
    BuildListener, BuildModel, BuildModelController, BuildSettings, DefaultFailureAnalyser,
    FailureAnalyser,
};
use crate::types::BuildIdentifier;

/// Model controller of one configured build. Settings and model are
/// computed on first use and cached.
#[derive(Debug)]
pub struct ConfiguredModelController {
    build: BuildIdentifier,
    config: Arc<CompositeConfig>,
    settings: OnceLock<Arc<BuildSettings>>,
    model: OnceLock<Arc<BuildModel>>,
}

impl ConfiguredModelController {
    pub fn new(build: BuildIdentifier, config: Arc<CompositeConfig>) -> Self {
        Self {
            build,
            config,
            settings: OnceLock::new(),
            model: OnceLock::new(),
        }
    }

    fn compute_model(&self) -> anyhow::Result<BuildModel> {
        let name = self.config.name_of(&self.build);
        let build = self
            .config
            .build_config(&self.build)
            .ok_or_else(|| anyhow!("{} is not configured", self.build))?;

        let mut resolver = TaskResolver::new(&self.config);
        let mut tasks = BTreeMap::new();
        for task_name in build.task.keys() {
            tasks.insert(task_name.clone(), resolver.resolve(name, task_name)?);
        }

        let mut requested = Vec::with_capacity(build.requested.len());
        for reference in &build.requested {
            let (owner, task_name) = split_task_ref(name, reference);
            requested.push(resolver.resolve(owner, task_name)?);
        }

        debug!(
            build = %self.build,
            tasks = tasks.len(),
            requested = requested.len(),
            "configured build model"
        );
        Ok(BuildModel {
            build: self.build.clone(),
            tasks,
            requested,
        })
    }
}

impl BuildModelController for ConfiguredModelController {
    fn loaded_settings(&self) -> anyhow::Result<Arc<BuildSettings>> {
        let settings = self.settings.get_or_init(|| {
            let included_builds = if self.build.is_root() {
                self.config
                    .identifiers()
                    .into_iter()
                    .filter(|id| !id.is_root())
                    .collect()
            } else {
                Vec::new()
            };
            Arc::new(BuildSettings {
                build: self.build.clone(),
                included_builds,
            })
        });
        Ok(Arc::clone(settings))
    }

    fn configured_model(&self) -> anyhow::Result<Arc<BuildModel>> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }
        let computed = Arc::new(self.compute_model()?);
        Ok(Arc::clone(self.model.get_or_init(|| computed)))
    }
}

/// Resolves configured task names into [`Task`] values, following `after`
/// references across builds.
struct TaskResolver<'a> {
    config: &'a CompositeConfig,
    resolved: HashMap<(String, String), TaskRef>,
    visiting: HashSet<(String, String)>,
}

impl<'a> TaskResolver<'a> {
    fn new(config: &'a CompositeConfig) -> Self {
        Self {
            config,
            resolved: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn resolve(&mut self, build: &str, task: &str) -> anyhow::Result<TaskRef> {
        let key = (build.to_string(), task.to_string());
        if let Some(resolved) = self.resolved.get(&key) {
            return Ok(Arc::clone(resolved));
        }
        if !self.visiting.insert(key.clone()) {
            bail!("task '{build}:{task}' depends on itself");
        }

        let composite = self.config;
        let config = composite
            .builds()
            .get(build)
            .and_then(|b| b.task.get(task))
            .ok_or_else(|| anyhow!("unknown task '{build}:{task}'"))?;

        let mut resolved = Task::new(composite.identifier_of(build), task);
        for dep in &config.after {
            let (dep_build, dep_task) = split_task_ref(build, dep);
            resolved = resolved.depends_on(self.resolve(dep_build, dep_task)?);
        }

        let resolved = resolved.into_ref();
        self.visiting.remove(&key);
        self.resolved.insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }
}

/// Creates lifecycles for the builds of a [`CompositeConfig`].
pub struct ConfiguredBuildFactory {
    config: Arc<CompositeConfig>,
    executor: Arc<dyn WorkExecutor>,
    analyser: Arc<dyn FailureAnalyser>,
    listeners: Vec<Arc<dyn BuildListener>>,
}

impl ConfiguredBuildFactory {
    pub fn new(config: Arc<CompositeConfig>, executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            config,
            executor,
            analyser: Arc::new(DefaultFailureAnalyser),
            listeners: Vec::new(),
        }
    }

    pub fn with_analyser(mut self, analyser: Arc<dyn FailureAnalyser>) -> Self {
        self.analyser = analyser;
        self
    }

    /// Register `listener` on every lifecycle this factory creates.
    pub fn with_listener(mut self, listener: Arc<dyn BuildListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl BuildLifecycleFactory for ConfiguredBuildFactory {
    fn create(&self, build: &BuildIdentifier) -> Result<BuildLifecycle> {
        if self.config.build_config(build).is_none() {
            return Err(CompositeError::UnknownBuild(build.to_string()));
        }

        let model = Arc::new(ConfiguredModelController::new(
            build.clone(),
            Arc::clone(&self.config),
        ));
        let services = BuildServices::new(model, Arc::clone(&self.executor))
            .with_analyser(Arc::clone(&self.analyser));

        let lifecycle = BuildLifecycle::new(build.clone(), services);
        for listener in &self.listeners {
            lifecycle.add_listener(Arc::clone(listener));
        }
        Ok(lifecycle)
    }
}
