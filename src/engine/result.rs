// src/engine/result.rs

//! Execution results and the failures they carry.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A shareable failure value.
///
/// Failures are recorded by the phase guard, returned from executions and
/// merged across builds, so they need to be cheap to clone. The wrapped
/// `anyhow::Error` keeps the original error available for downcasting.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Failure(Arc::new(err.into()))
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Failure(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether both values are clones of the same recorded failure.
    pub fn same_as(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Outcome of running work: either a value, or an ordered list of failures.
///
/// Merging with [`ExecutionResult::with_failures`] is associative and keeps
/// failures in insertion order, which is what makes the composite report
/// reproducible.
#[derive(Debug, Clone)]
pub enum ExecutionResult<T> {
    Succeeded(T),
    Failed(Vec<Failure>),
}

impl ExecutionResult<()> {
    pub fn succeeded() -> Self {
        ExecutionResult::Succeeded(())
    }

    /// Success when `failures` is empty, otherwise a failed result.
    pub fn maybe_failed(failures: Vec<Failure>) -> Self {
        if failures.is_empty() {
            ExecutionResult::Succeeded(())
        } else {
            ExecutionResult::Failed(failures)
        }
    }
}

impl<T> ExecutionResult<T> {
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        ExecutionResult::Failed(vec![Failure::new(err)])
    }

    pub fn from_failure(failure: Failure) -> Self {
        ExecutionResult::Failed(vec![failure])
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        !self.is_success()
    }

    pub fn failures(&self) -> &[Failure] {
        match self {
            ExecutionResult::Succeeded(_) => &[],
            ExecutionResult::Failed(failures) => failures,
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            ExecutionResult::Succeeded(value) => Some(value),
            ExecutionResult::Failed(_) => None,
        }
    }

    /// Append the failures of `other` after the failures of `self`.
    ///
    /// The value of `self` survives only if neither side failed.
    pub fn with_failures<U>(self, other: ExecutionResult<U>) -> ExecutionResult<T> {
        match (self, other) {
            (this, ExecutionResult::Succeeded(_)) => this,
            (ExecutionResult::Succeeded(_), ExecutionResult::Failed(failures)) => {
                ExecutionResult::Failed(failures)
            }
            (ExecutionResult::Failed(mut mine), ExecutionResult::Failed(theirs)) => {
                mine.extend(theirs);
                ExecutionResult::Failed(mine)
            }
        }
    }
}
