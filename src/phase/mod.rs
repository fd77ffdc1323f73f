// src/phase/mod.rs

//! Build lifecycle phases and the guard that protects them.
//!
//! - [`guard`] holds [`PhaseGuard`], a generic state-transition primitive.
//! - [`BuildPhase`] is the phase machine of a single build.

pub mod guard;

pub use guard::PhaseGuard;

/// Lifecycle phase of one build.
///
/// ```text
/// Configure -> TaskSchedule -> ReadyToRun -> Configure (next round)
///      \              \              \
///       +--------------+--------------+--> Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// Configuring the build; the build model may be queried.
    Configure,
    /// Scheduling tasks into the work graph.
    TaskSchedule,
    /// Work graph finalized; waiting to execute.
    ReadyToRun,
    /// The build has finished and does no further work.
    Finished,
}
