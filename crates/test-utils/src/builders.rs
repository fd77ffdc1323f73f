#![allow(dead_code)]

use std::collections::BTreeMap;

use composite_build::config::{
    BuildConfig, CompositeConfig, EngineSection, RawCompositeConfig, TaskConfig,
};

/// Builder for `CompositeConfig` to simplify test setup.
pub struct CompositeConfigBuilder {
    config: RawCompositeConfig,
}

impl CompositeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawCompositeConfig {
                config: EngineSection::default(),
                build: BTreeMap::new(),
            },
        }
    }

    pub fn with_build(mut self, name: &str, build: BuildConfig) -> Self {
        self.config.build.insert(name.to_string(), build);
        self
    }

    pub fn with_poll_interval(mut self, interval: &str) -> Self {
        self.config.config.monitoring_poll_interval = interval.to_string();
        self
    }

    /// The raw, unvalidated description.
    pub fn raw(self) -> RawCompositeConfig {
        self.config
    }

    pub fn build(self) -> CompositeConfig {
        CompositeConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for CompositeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `BuildConfig`.
pub struct BuildConfigBuilder {
    build: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self {
            build: BuildConfig::default(),
        }
    }

    pub fn root() -> Self {
        Self::new().as_root()
    }

    pub fn as_root(mut self) -> Self {
        self.build.root = true;
        self
    }

    pub fn requesting(mut self, task: &str) -> Self {
        self.build.requested.push(task.to_string());
        self
    }

    /// Add a task running after each of `after`.
    pub fn with_task(mut self, name: &str, after: &[&str]) -> Self {
        self.build.task.insert(
            name.to_string(),
            TaskConfig {
                after: after.iter().map(|dep| dep.to_string()).collect(),
            },
        );
        self
    }

    pub fn build(self) -> BuildConfig {
        self.build
    }
}

impl Default for BuildConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
