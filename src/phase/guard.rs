// src/phase/guard.rs

//! Phase guard: a state-transition primitive shared across threads.
//!
//! The guard owns the current phase of one logical owner (a build) together
//! with every failure recorded by its transitions. Exclusion is explicit:
//! a `Mutex` protects the state and a `Condvar` wakes threads waiting for
//! the holder slot. Actions run *outside* the raw mutex, with the holder
//! slot marking which thread currently owns the guard. That is what allows
//! the holder to perform nested read-only queries through
//! [`PhaseGuard::not_in_state_ignore_other_threads`].
//!
//! Phase violations never block or retry; they fail with
//! [`CompositeError::IllegalPhase`] as soon as the guard is acquired.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

use crate::engine::{ExecutionResult, Failure};
use crate::errors::{CompositeError, Result};

pub struct PhaseGuard<P> {
    /// Human readable owner, e.g. "state of build 'lib'".
    owner: String,
    state: Mutex<GuardState<P>>,
    released: Condvar,
}

struct GuardState<P> {
    phase: P,
    /// Thread currently running a guarded operation, if any.
    holder: Option<ThreadId>,
    /// Failures recorded by transitions over the guard's lifetime.
    failures: Vec<Failure>,
}

/// Exclusive hold on a guard. Dropping it frees the holder slot, also when
/// the guarded action panics.
struct Lease<'a, P> {
    guard: &'a PhaseGuard<P>,
    phase: P,
}

impl<P: Copy> Lease<'_, P> {
    fn advance(&self, to: P) {
        self.guard.lock().phase = to;
    }

    fn record(&self, failures: &[Failure]) {
        if failures.is_empty() {
            return;
        }
        self.guard.lock().failures.extend(failures.iter().cloned());
    }

    fn failures(&self) -> Vec<Failure> {
        self.guard.lock().failures.clone()
    }
}

impl<P> Drop for Lease<'_, P> {
    fn drop(&mut self) {
        let mut state = self.guard.lock();
        state.holder = None;
        drop(state);
        self.guard.released.notify_all();
    }
}

impl<P> PhaseGuard<P> {
    fn lock(&self) -> MutexGuard<'_, GuardState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl<P: Copy + Eq + fmt::Debug> PhaseGuard<P> {
    pub fn new(owner: impl Into<String>, initial: P) -> Self {
        Self {
            owner: owner.into(),
            state: Mutex::new(GuardState {
                phase: initial,
                holder: None,
                failures: Vec::new(),
            }),
            released: Condvar::new(),
        }
    }

    /// Snapshot of the current phase.
    pub fn current(&self) -> P {
        self.lock().phase
    }

    /// Snapshot of the failures recorded so far.
    pub fn failures(&self) -> Vec<Failure> {
        self.lock().failures.clone()
    }

    /// Fail unless the current phase differs from `forbidden`. Does not
    /// acquire the guard.
    pub fn assert_not_in_state(&self, forbidden: P) -> Result<()> {
        self.check_not(self.current(), forbidden)
    }

    /// Run `action` exclusively, provided the phase is not `forbidden`.
    pub fn not_in_state<T>(&self, forbidden: P, action: impl FnOnce() -> T) -> Result<T> {
        let lease = self.acquire()?;
        self.check_not(lease.phase, forbidden)?;
        Ok(action())
    }

    /// Like [`PhaseGuard::not_in_state`], but a thread that already holds the
    /// guard re-enters without acquiring it. Other threads are guarded as
    /// usual.
    pub fn not_in_state_ignore_other_threads<T>(
        &self,
        forbidden: P,
        action: impl FnOnce() -> T,
    ) -> Result<T> {
        let me = thread::current().id();
        let state = self.lock();
        if state.holder == Some(me) {
            let phase = state.phase;
            drop(state);
            trace!(owner = %self.owner, "re-entering guard held by current thread");
            self.check_not(phase, forbidden)?;
            return Ok(action());
        }
        drop(state);

        self.not_in_state(forbidden, action)
    }

    /// Run `action` exclusively, provided the phase is `expected`.
    pub fn in_state<T>(&self, expected: P, action: impl FnOnce() -> T) -> Result<T> {
        let lease = self.acquire()?;
        self.check_in(lease.phase, expected)?;
        Ok(action())
    }

    /// Transition `from -> to` unless the guard already sits in `to`.
    ///
    /// Repeated calls after the first successful one are no-ops and do not
    /// run `action` again.
    pub fn maybe_transition<E>(
        &self,
        from: P,
        to: P,
        action: impl FnOnce() -> std::result::Result<(), E>,
    ) -> Result<()>
    where
        E: Into<anyhow::Error>,
    {
        let lease = self.acquire()?;
        if lease.phase == to {
            trace!(owner = %self.owner, phase = ?to, "already transitioned; skipping");
            return Ok(());
        }
        self.run_transition(&lease, from, to, action)
    }

    /// Transition `from -> to`, running `action` first.
    ///
    /// If `action` fails the phase stays at `from`; the failure is recorded
    /// and returned as [`CompositeError::Failed`].
    pub fn transition<T, E>(
        &self,
        from: P,
        to: P,
        action: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<T>
    where
        E: Into<anyhow::Error>,
    {
        let lease = self.acquire()?;
        self.run_transition(&lease, from, to, action)
    }

    /// Transition `from -> to` around an action whose result encodes its own
    /// failures. The phase always advances; failures are recorded and the
    /// result is handed back untouched.
    pub fn try_transition<T>(
        &self,
        from: P,
        to: P,
        action: impl FnOnce() -> ExecutionResult<T>,
    ) -> Result<ExecutionResult<T>> {
        let lease = self.acquire()?;
        self.check_transition(lease.phase, from, to)?;

        let result = action();
        lease.record(result.failures());
        lease.advance(to);
        debug!(
            owner = %self.owner,
            ?from,
            ?to,
            failures = result.failures().len(),
            "phase transition"
        );
        Ok(result)
    }

    /// Move to `terminal`, exactly once.
    ///
    /// `finalizer` sees every failure recorded so far; the returned result
    /// is those failures followed by the finalizer's own.
    pub fn finish(
        &self,
        terminal: P,
        finalizer: impl FnOnce(&ExecutionResult<()>) -> ExecutionResult<()>,
    ) -> Result<ExecutionResult<()>> {
        let lease = self.acquire()?;
        if lease.phase == terminal {
            return Err(self.illegal(format!("already in terminal phase {terminal:?}")));
        }

        let stage_failures = ExecutionResult::maybe_failed(lease.failures());
        let finish_result = finalizer(&stage_failures);
        lease.advance(terminal);
        debug!(owner = %self.owner, from = ?lease.phase, to = ?terminal, "finished");

        Ok(stage_failures.with_failures(finish_result))
    }

    fn run_transition<T, E>(
        &self,
        lease: &Lease<'_, P>,
        from: P,
        to: P,
        action: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<T>
    where
        E: Into<anyhow::Error>,
    {
        self.check_transition(lease.phase, from, to)?;

        match action() {
            Ok(value) => {
                lease.advance(to);
                debug!(owner = %self.owner, ?from, ?to, "phase transition");
                Ok(value)
            }
            Err(err) => {
                let failure = Failure::new(err);
                lease.record(std::slice::from_ref(&failure));
                debug!(
                    owner = %self.owner,
                    ?from,
                    ?to,
                    error = %failure,
                    "transition action failed; phase unchanged"
                );
                Err(CompositeError::Failed(failure))
            }
        }
    }

    fn acquire(&self) -> Result<Lease<'_, P>> {
        let me = thread::current().id();
        let mut state = self.lock();
        loop {
            match state.holder {
                None => break,
                Some(holder) if holder == me => {
                    return Err(self.illegal(
                        "guard is already held by the current thread".to_string(),
                    ));
                }
                Some(_) => {}
            }
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.holder = Some(me);

        Ok(Lease {
            guard: self,
            phase: state.phase,
        })
    }

    fn check_not(&self, actual: P, forbidden: P) -> Result<()> {
        if actual == forbidden {
            return Err(self.illegal(format!("should not be in phase {forbidden:?}")));
        }
        Ok(())
    }

    fn check_in(&self, actual: P, expected: P) -> Result<()> {
        if actual != expected {
            return Err(self.illegal(format!(
                "expected phase {expected:?} but is in {actual:?}"
            )));
        }
        Ok(())
    }

    fn check_transition(&self, actual: P, from: P, to: P) -> Result<()> {
        if actual != from {
            return Err(self.illegal(format!(
                "can only transition from {from:?} to {to:?}, but is in {actual:?}"
            )));
        }
        Ok(())
    }

    fn illegal(&self, message: String) -> CompositeError {
        CompositeError::IllegalPhase {
            owner: self.owner.clone(),
            message,
        }
    }
}

impl<P: Copy + fmt::Debug> fmt::Debug for PhaseGuard<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PhaseGuard")
            .field("owner", &self.owner)
            .field("phase", &state.phase)
            .field("failures", &state.failures.len())
            .finish_non_exhaustive()
    }
}
