// src/model/listeners.rs

//! "Build finished" notifications.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use tracing::warn;

use crate::engine::Failure;
use crate::types::BuildIdentifier;

/// What a finished build did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildAction {
    /// Tasks were scheduled for the build.
    RanTasks,
    /// The build was only ever configured.
    ConfigurationOnly,
}

impl BuildAction {
    pub fn label(&self) -> &'static str {
        match self {
            BuildAction::RanTasks => "Build",
            BuildAction::ConfigurationOnly => "Configure",
        }
    }
}

/// Payload of the "build finished" notification.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub action: BuildAction,
    pub build: BuildIdentifier,
    pub failure: Option<Failure>,
}

impl BuildResult {
    pub fn label(&self) -> &'static str {
        self.action.label()
    }
}

pub trait BuildListener: Send + Sync {
    fn build_finished(&self, result: &BuildResult) -> anyhow::Result<()>;
}

/// Listeners registered on one build.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn BuildListener>>>,
}

impl ListenerRegistry {
    /// Register `listener`. Returns `false` if it was already registered.
    pub fn add(&self, listener: Arc<dyn BuildListener>) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every listener, even when earlier ones fail.
    pub fn build_finished(&self, result: &BuildResult) -> anyhow::Result<()> {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut errors = Vec::new();
        for listener in listeners {
            if let Err(err) = listener.build_finished(result) {
                warn!(build = %result.build, error = %err, "build listener failed");
                errors.push(err);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            n => Err(anyhow!(
                "{n} build listeners failed: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            )),
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
