// src/model/mod.rs

//! Collaborators a build lifecycle consumes.
//!
//! Evaluating build scripts and computing a build's model is not this
//! crate's business; it only needs an object that hands out the settings and
//! the configured model, caching them as it sees fit. That object is the
//! [`BuildModelController`].
//!
//! - [`failure`] merges many failures into one representative cause.
//! - [`listeners`] carries the "build finished" notification.
//! - [`configured`] implements the collaborators on top of a
//!   [`crate::config::CompositeConfig`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dag::{ExecutionPlan, TaskRef};
use crate::types::BuildIdentifier;

pub mod configured;
pub mod failure;
pub mod listeners;

pub use configured::{ConfiguredBuildFactory, ConfiguredModelController};
pub use failure::{DefaultFailureAnalyser, FailureAnalyser, MultipleBuildFailures};
pub use listeners::{BuildAction, BuildListener, BuildResult, ListenerRegistry};

/// Settings of one build: which build it is and which builds it includes.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub build: BuildIdentifier,
    pub included_builds: Vec<BuildIdentifier>,
}

/// The configured model of one build.
#[derive(Debug, Clone)]
pub struct BuildModel {
    pub build: BuildIdentifier,
    /// All tasks of the build, by name.
    pub tasks: BTreeMap<String, TaskRef>,
    /// Tasks asked for when the invocation started.
    pub requested: Vec<TaskRef>,
}

impl BuildModel {
    pub fn task(&self, name: &str) -> Option<&TaskRef> {
        self.tasks.get(name)
    }
}

/// Gives access to a build's settings and model, computing them lazily.
pub trait BuildModelController: Send + Sync {
    fn loaded_settings(&self) -> anyhow::Result<Arc<BuildSettings>>;

    fn configured_model(&self) -> anyhow::Result<Arc<BuildModel>>;

    /// Called once per scheduling round, before the work graph is created.
    fn prepare_to_schedule_tasks(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-time seeding hook run on every freshly created plan.
    fn initialize_work_graph(&self, _plan: &mut ExecutionPlan) -> anyhow::Result<()> {
        Ok(())
    }

    /// Add the tasks originally requested for this build.
    fn schedule_requested_tasks(&self, plan: &mut ExecutionPlan) -> anyhow::Result<()> {
        let model = self.configured_model()?;
        for task in &model.requested {
            plan.add_entry_task(task)?;
        }
        Ok(())
    }
}
