//! Workspace cleanup engine for a CI job runner.
//!
//! Given a build's workspace root (and, for matrix builds, the parent's shared
//! root), the engine deletes entries matching a declarative rule set either
//! before the build starts or after it finishes. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (pattern verdicts, command
//!   templates, outcome policy, lifecycle, root aggregation). No I/O.
//! - **[`io`]**: Side-effecting operations (scanning, deletion, process
//!   execution, config loading, collaborator adapters).
//!
//! [`cleanup`] composes the two into the pre-build and post-build entry points.

pub mod cleanup;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
