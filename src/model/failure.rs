// src/model/failure.rs

use thiserror::Error;

use crate::engine::Failure;

/// Turns the failures of one build into a single reportable cause.
pub trait FailureAnalyser: Send + Sync {
    fn transform(&self, failures: &[Failure]) -> Failure;
}

/// Several failures reported as one.
#[derive(Debug, Error)]
#[error("{} failures occurred: {}", .causes.len(), list_causes(.causes))]
pub struct MultipleBuildFailures {
    pub causes: Vec<Failure>,
}

fn list_causes(causes: &[Failure]) -> String {
    causes
        .iter()
        .enumerate()
        .map(|(i, cause)| format!("[{}] {cause}", i + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Passes a single failure through unchanged and wraps several into a
/// [`MultipleBuildFailures`], keeping their order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFailureAnalyser;

impl FailureAnalyser for DefaultFailureAnalyser {
    fn transform(&self, failures: &[Failure]) -> Failure {
        match failures {
            [] => Failure::msg("build failed without a recorded cause"),
            [single] => single.clone(),
            many => Failure::new(MultipleBuildFailures {
                causes: many.to_vec(),
            }),
        }
    }
}
