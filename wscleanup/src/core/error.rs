//! Typed errors surfaced by core validation and lifecycle checks.

use crate::core::lifecycle::BuildPhase;

/// Configuration problems detected before any build runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("external command template is empty")]
    EmptyCommand,
    #[error(
        "external command template '{template}' has {count} path placeholders, at most one is allowed"
    )]
    TooManyPlaceholders { template: String, count: usize },
    #[error("external command template '{template}' cannot be parsed: {message}")]
    MalformedCommand { template: String, message: String },
}

/// Illegal transitions of the per-build cleanup state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("pre-build cleanup must run before build steps start (build is {0})")]
    PreBuildTooLate(BuildPhase),
    #[error("post-build cleanup requires a finished build (build is {0})")]
    NotTerminal(BuildPhase),
    #[error("post-build cleanup already ran for this build")]
    AlreadyCleaned,
    #[error("cannot {action} a build that is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: BuildPhase,
    },
}
