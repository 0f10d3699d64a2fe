//! Adapters for the job runner hosting the cleanup engine.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::types::{ParentRef, WorkspaceRoot};

/// Build log sink and build-result handle of the running build.
pub trait BuildListener: Send + Sync {
    /// Append one line to the build log.
    fn log(&self, line: &str);

    /// Mark the build failed. Only called when cleanup errors escalate.
    fn mark_build_failed(&self);
}

/// Writes build-log lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleListener {
    failed: AtomicBool,
}

impl ConsoleListener {
    pub fn build_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl BuildListener for ConsoleListener {
    fn log(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not abort cleanup.
        let _ = writeln!(out, "[ws-cleanup] {line}");
    }

    fn mark_build_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

/// Looks up a matrix parent's workspace at the moment cleanup runs.
pub trait ParentResolver: Send + Sync {
    fn parent_workspace(&self, parent: &ParentRef) -> Option<WorkspaceRoot>;
}

/// Resolver for runners without matrix builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParents;

impl ParentResolver for NoParents {
    fn parent_workspace(&self, _parent: &ParentRef) -> Option<WorkspaceRoot> {
        None
    }
}

/// Resolves every parent reference to one known workspace.
#[derive(Debug, Clone)]
pub struct FixedParent(pub WorkspaceRoot);

impl ParentResolver for FixedParent {
    fn parent_workspace(&self, _parent: &ParentRef) -> Option<WorkspaceRoot> {
        Some(self.0.clone())
    }
}
