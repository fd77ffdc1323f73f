// src/lib.rs

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod model;
pub mod phase;
pub mod types;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CompositeConfig;
use crate::engine::{BuildRegistry, ExecutionResult};
use crate::errors::{CompositeError, Result};
use crate::exec::{EngineHealth, WorkExecutor};
use crate::model::ConfiguredBuildFactory;
use crate::types::BuildIdentifier;

/// High-level entry point: run every requested task of a composite.
///
/// This wires together:
/// - the config-backed build factory
/// - the registry and its cross-build fixpoint
/// - concurrent execution through `executor`, which also reports the
///   engine's health
/// - finishing and stopping every build
///
/// The returned result is the merge of every build's finish result, in
/// build order. It includes task failures as well as failures recorded
/// while scheduling.
pub async fn run<E>(config: CompositeConfig, executor: Arc<E>) -> Result<ExecutionResult<()>>
where
    E: WorkExecutor + EngineHealth + 'static,
{
    let config = Arc::new(config);
    let health: Arc<dyn EngineHealth> = executor.clone();
    let factory = ConfiguredBuildFactory::new(Arc::clone(&config), executor);
    let registry = BuildRegistry::new(Arc::new(factory), health, config.registry_options());

    let requesting: Vec<BuildIdentifier> = config
        .identifiers()
        .into_iter()
        .filter(|build| {
            build.is_root()
                || config
                    .build_config(build)
                    .is_some_and(|b| !b.requested.is_empty())
        })
        .collect();

    let finished = run_builds(&registry, &requesting).await?;
    info!(
        builds = config.builds().len(),
        failures = finished.failures().len(),
        "composite build complete"
    );
    Ok(finished)
}

/// Schedule the requested tasks of `requesting`, execute every build the
/// registry ends up with, then finish and close them all.
///
/// Builds are finished and closed on every error except an unhealthy
/// engine, whose builds may still be running.
pub async fn run_builds(
    registry: &BuildRegistry,
    requesting: &[BuildIdentifier],
) -> Result<ExecutionResult<()>> {
    match schedule_and_execute(registry, requesting).await {
        Ok(_) => {}
        // Already recorded by the failing build; reported when it finishes.
        Err(CompositeError::Failed(failure)) => {
            warn!(error = %failure, "scheduling failed; finishing builds");
        }
        Err(err @ CompositeError::UnhealthyEngine(_)) => return Err(err),
        Err(err) => {
            warn!(error = %err, "composite build aborted; finishing builds");
            if let Err(finish) = registry.finish_builds() {
                warn!(error = %finish, "failed to finish builds");
            }
            if let Err(close) = registry.close() {
                warn!(error = %close, "failed to close builds");
            }
            return Err(err);
        }
    }

    let finished = registry.finish_builds()?;
    registry.close()?;
    Ok(finished)
}

async fn schedule_and_execute(
    registry: &BuildRegistry,
    requesting: &[BuildIdentifier],
) -> Result<ExecutionResult<()>> {
    for build in requesting {
        registry
            .get_controller(build)?
            .populate_work_graph(|graph| graph.add_requested_tasks())?;
    }

    registry.populate_work_graphs()?;
    registry.execute().await
}
