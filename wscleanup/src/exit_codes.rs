//! Stable exit codes for the `wscleanup` CLI.

/// Cleanup ran (or was skipped by policy) without affecting the build.
pub const OK: i32 = 0;
/// Invalid configuration, bad arguments, or an unexpected error.
pub const INVALID: i32 = 1;
/// Cleanup asked the runner to fail the build (post-build) or abort it (pre-build).
pub const BUILD_FAILED: i32 = 2;
