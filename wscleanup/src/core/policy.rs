//! Post-build outcome policy.

use crate::core::types::{BuildStatus, OutcomeFlags};

/// Decide whether post-build cleanup fires for `status`.
///
/// Each status maps to exactly one flag; no other flag influences the answer.
pub fn should_clean(status: BuildStatus, flags: &OutcomeFlags) -> bool {
    match status {
        BuildStatus::Success => flags.on_success,
        BuildStatus::Unstable => flags.on_unstable,
        BuildStatus::Failure => flags.on_failure,
        BuildStatus::Aborted => flags.on_aborted,
        BuildStatus::NotBuilt => flags.on_not_built,
    }
}
