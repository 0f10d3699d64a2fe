//! Per-build cleanup state machine.
//!
//! ```text
//! Running -> (pre-build cleanup) -> BuildSteps -> Terminal(status) -> (post-build cleanup) -> Done
//! ```
//!
//! `Terminal` is the only phase the outcome policy is evaluated from, and
//! `Done` is absorbing: cleanup never runs twice for the same build.

use std::fmt;

use crate::core::error::LifecycleError;
use crate::core::types::BuildStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Build created, no steps executed yet.
    Running,
    /// Build steps are executing (pre-build cleanup, if any, has run).
    BuildSteps,
    /// Build finished with a status; post-build cleanup pending.
    Terminal(BuildStatus),
    /// Post-build cleanup phase completed (fired or skipped).
    Done,
}

impl BuildPhase {
    /// Transition taken by pre-build cleanup.
    pub fn pre_build_cleanup(self) -> Result<Self, LifecycleError> {
        match self {
            BuildPhase::Running => Ok(BuildPhase::BuildSteps),
            other => Err(LifecycleError::PreBuildTooLate(other)),
        }
    }

    /// Enter build steps without pre-build cleanup. Idempotent once in `BuildSteps`.
    pub fn begin_steps(self) -> Result<Self, LifecycleError> {
        match self {
            BuildPhase::Running | BuildPhase::BuildSteps => Ok(BuildPhase::BuildSteps),
            phase => Err(LifecycleError::InvalidTransition {
                action: "begin steps of",
                phase,
            }),
        }
    }

    pub fn finish(self, status: BuildStatus) -> Result<Self, LifecycleError> {
        match self {
            BuildPhase::Running | BuildPhase::BuildSteps => Ok(BuildPhase::Terminal(status)),
            phase => Err(LifecycleError::InvalidTransition {
                action: "finish",
                phase,
            }),
        }
    }

    /// Transition taken by post-build cleanup; yields the status the policy is evaluated on.
    pub fn post_build_cleanup(self) -> Result<(BuildStatus, Self), LifecycleError> {
        match self {
            BuildPhase::Terminal(status) => Ok((status, BuildPhase::Done)),
            BuildPhase::Done => Err(LifecycleError::AlreadyCleaned),
            other => Err(LifecycleError::NotTerminal(other)),
        }
    }

    pub fn terminal_status(self) -> Option<BuildStatus> {
        match self {
            BuildPhase::Terminal(status) => Some(status),
            _ => None,
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Running => f.write_str("running"),
            BuildPhase::BuildSteps => f.write_str("executing build steps"),
            BuildPhase::Terminal(status) => write!(f, "finished ({status})"),
            BuildPhase::Done => f.write_str("done"),
        }
    }
}
