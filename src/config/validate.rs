// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    CompositeConfig, RawCompositeConfig, parse_duration, split_task_ref,
};
use crate::errors::{CompositeError, Result};

impl TryFrom<RawCompositeConfig> for CompositeConfig {
    type Error = crate::errors::CompositeError;

    fn try_from(raw: RawCompositeConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let interval = parse_poll_interval(&raw)?;
        let root = find_root(&raw)?;
        Ok(CompositeConfig::new_unchecked(
            raw.config, interval, raw.build, root,
        ))
    }
}

fn validate_raw_config(cfg: &RawCompositeConfig) -> Result<()> {
    ensure_has_builds(cfg)?;
    validate_names(cfg)?;
    find_root(cfg)?;
    parse_poll_interval(cfg)?;
    validate_task_references(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_builds(cfg: &RawCompositeConfig) -> Result<()> {
    if cfg.build.is_empty() {
        return Err(CompositeError::ConfigError(
            "config must contain at least one [build.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(cfg: &RawCompositeConfig) -> Result<()> {
    for (name, build) in &cfg.build {
        if name.is_empty() || name.contains(':') {
            return Err(CompositeError::ConfigError(format!(
                "invalid build name '{}': must be non-empty and must not contain ':'",
                name
            )));
        }
        for task in build.task.keys() {
            if task.is_empty() || task.contains(':') {
                return Err(CompositeError::ConfigError(format!(
                    "invalid task name '{}' in build '{}': must be non-empty and must not contain ':'",
                    task, name
                )));
            }
        }
    }
    Ok(())
}

fn find_root(cfg: &RawCompositeConfig) -> Result<String> {
    let roots: Vec<&String> = cfg
        .build
        .iter()
        .filter(|(_, build)| build.root)
        .map(|(name, _)| name)
        .collect();

    match roots.as_slice() {
        [root] => Ok((*root).clone()),
        [] => Err(CompositeError::ConfigError(
            "exactly one build must set `root = true` (found none)".to_string(),
        )),
        many => Err(CompositeError::ConfigError(format!(
            "exactly one build must set `root = true` (found {})",
            many.iter()
                .map(|name| format!("'{name}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn parse_poll_interval(cfg: &RawCompositeConfig) -> Result<std::time::Duration> {
    let raw = &cfg.config.monitoring_poll_interval;
    let interval = parse_duration(raw).map_err(|e| {
        CompositeError::ConfigError(format!(
            "[config].monitoring_poll_interval '{}' is invalid: {}",
            raw, e
        ))
    })?;
    if interval.is_zero() {
        return Err(CompositeError::ConfigError(
            "[config].monitoring_poll_interval must be greater than zero".to_string(),
        ));
    }
    Ok(interval)
}

fn resolves(cfg: &RawCompositeConfig, build: &str, task: &str) -> bool {
    cfg.build
        .get(build)
        .is_some_and(|b| b.task.contains_key(task))
}

fn validate_task_references(cfg: &RawCompositeConfig) -> Result<()> {
    for (name, build) in &cfg.build {
        for requested in &build.requested {
            let (dep_build, dep_task) = split_task_ref(name, requested);
            if !resolves(cfg, dep_build, dep_task) {
                return Err(CompositeError::ConfigError(format!(
                    "build '{}' requests unknown task '{}'",
                    name, requested
                )));
            }
        }

        for (task_name, task) in &build.task {
            for dep in &task.after {
                let (dep_build, dep_task) = split_task_ref(name, dep);
                if !resolves(cfg, dep_build, dep_task) {
                    return Err(CompositeError::ConfigError(format!(
                        "task '{}:{}' has unknown dependency '{}' in `after`",
                        name, task_name, dep
                    )));
                }
                if dep_build == name.as_str() && dep_task == task_name.as_str() {
                    return Err(CompositeError::ConfigError(format!(
                        "task '{}:{}' cannot depend on itself in `after`",
                        name, task_name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawCompositeConfig) -> Result<()> {
    // One graph over every task of every build, keyed by (build, task).
    //
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<(&str, &str), ()> = DiGraphMap::new();

    for (name, build) in &cfg.build {
        for task in build.task.keys() {
            graph.add_node((name.as_str(), task.as_str()));
        }
    }

    for (name, build) in &cfg.build {
        for (task_name, task) in &build.task {
            for dep in &task.after {
                let dep = split_task_ref(name, dep);
                graph.add_edge(dep, (name.as_str(), task_name.as_str()), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let (build, task) = cycle.node_id();
            Err(CompositeError::InvalidWorkGraph(format!(
                "cycle detected in composite task graph involving task '{}:{}'",
                build, task
            )))
        }
    }
}
