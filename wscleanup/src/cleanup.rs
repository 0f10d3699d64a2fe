//! Pre-build and post-build cleanup entry points.
//!
//! Both entry points take the build's [`BuildContext`] by mutable reference and
//! advance its lifecycle, so cleanup can never run twice for the same build.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::aggregate::plan_roots;
use crate::core::policy::should_clean;
use crate::core::types::{
    BuildContext, CleanupSpec, OutcomeFlags, PathOutcome, PathResult, WorkspaceRoot,
};
use crate::io::build::{BuildListener, ParentResolver};
use crate::io::config::EngineConfig;
use crate::io::deferred::{self, PendingWipeout};
use crate::io::delete::{DeleteMode, DeletionExecutor};
use crate::io::process::CommandRunner;
use crate::io::scan::{Selection, select};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPhase {
    PreBuild,
    PostBuild,
}

/// What the job runner must do with the build after cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildEffect {
    /// Leave the build outcome unchanged.
    Continue,
    /// Post-build failures escalated; the build has been marked failed.
    FailBuild,
    /// Pre-build cleanup failed; build steps must not run.
    AbortBuild,
}

/// Results for one workspace root.
#[derive(Debug, Clone, Serialize)]
pub struct RootReport {
    pub root: WorkspaceRoot,
    /// The root did not exist when cleanup ran (trivially clean).
    pub missing: bool,
    pub results: Vec<PathResult>,
}

/// Structured outcome of one cleanup invocation.
#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub phase: CleanupPhase,
    pub build: String,
    /// Why cleanup did not run at all, if it didn't.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub roots: Vec<RootReport>,
    pub effect: BuildEffect,
    #[serde(skip)]
    pending: Vec<PendingWipeout>,
}

impl CleanupReport {
    fn new(phase: CleanupPhase, context: &BuildContext) -> Self {
        Self {
            phase,
            build: context.id.clone(),
            skipped: None,
            roots: Vec::new(),
            effect: BuildEffect::Continue,
            pending: Vec::new(),
        }
    }

    fn skipped(mut self, reason: String) -> Self {
        self.skipped = Some(reason);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &PathResult> {
        self.roots.iter().flat_map(|root| root.results.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PathResult> {
        self.results().filter(|result| result.is_failed())
    }

    /// No path failed (a skipped cleanup is successful).
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn has_pending_wipeouts(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait for background removal of deferred wipeout directories.
    pub fn wait_for_deferred(&mut self) -> Result<()> {
        let mut first_err = None;
        for pending in self.pending.drain(..) {
            if let Err(err) = pending.wait() {
                warn!(err = %err, "deferred wipeout incomplete");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Clean the build's own workspace before its steps run.
///
/// Runs unconditionally once configured (subject only to the
/// `cleanup_parameter` gate). Any failed path yields [`BuildEffect::AbortBuild`].
/// `Err` is reserved for lifecycle misuse.
#[instrument(skip_all, fields(build = %context.id))]
pub fn run_pre_build_cleanup<R: CommandRunner, L: BuildListener>(
    spec: &CleanupSpec,
    context: &mut BuildContext,
    runner: &R,
    listener: &L,
    engine: &EngineConfig,
) -> Result<CleanupReport> {
    context.enter_pre_build_cleanup()?;
    let report = CleanupReport::new(CleanupPhase::PreBuild, context);

    if let Some(reason) = parameter_gate(spec, context) {
        listener.log(&reason);
        return Ok(report.skipped(reason));
    }

    let roots: Vec<WorkspaceRoot> = context.workspace.iter().cloned().collect();
    let mut report = clean_roots(report, &roots, spec, runner, listener, engine);

    if !report.is_success() {
        listener.log("Cleanup before build failed, aborting build");
        report.effect = BuildEffect::AbortBuild;
    }
    Ok(report)
}

/// Clean after the build finished, if the outcome policy selects its status.
///
/// Matrix children also clean the parent's workspace when
/// `cleanup_matrix_parent` is set. Failures change the build outcome only with
/// `fail_build_on_cleanup_error`.
#[instrument(skip_all, fields(build = %context.id))]
pub fn run_post_build_cleanup<R: CommandRunner, L: BuildListener, P: ParentResolver>(
    spec: &CleanupSpec,
    flags: &OutcomeFlags,
    context: &mut BuildContext,
    runner: &R,
    listener: &L,
    parents: &P,
    engine: &EngineConfig,
) -> Result<CleanupReport> {
    let status = context.enter_post_build_cleanup()?;
    let report = CleanupReport::new(CleanupPhase::PostBuild, context);

    if !should_clean(status, flags) {
        debug!(%status, "status not selected for cleanup");
        return Ok(report.skipped(format!("build status {status} is not selected for cleanup")));
    }
    if let Some(reason) = parameter_gate(spec, context) {
        listener.log(&reason);
        return Ok(report.skipped(reason));
    }

    let plan = plan_roots(context, flags, |parent| parents.parent_workspace(parent));
    if let Some(parent) = &plan.unresolved_parent {
        debug!(%parent, "parent build not found, skipping its workspace");
    }

    let mut report = clean_roots(report, &plan.roots, spec, runner, listener, engine);

    if !report.is_success() {
        if flags.fail_build_on_cleanup_error {
            listener.log("Cleanup failed, marking build as failed");
            listener.mark_build_failed();
            report.effect = BuildEffect::FailBuild;
        } else {
            warn!("cleanup failures left the build outcome unchanged");
        }
    }
    Ok(report)
}

/// Reason to skip cleanup when the build variable named by `cleanup_parameter` isn't `true`.
fn parameter_gate(spec: &CleanupSpec, context: &BuildContext) -> Option<String> {
    let name = spec.cleanup_parameter.as_deref()?;
    match context.env.get(name) {
        Some(value) if value.trim().eq_ignore_ascii_case("true") => None,
        Some(value) => Some(format!(
            "Cleanup disabled by build variable {name}={value}, skipping"
        )),
        None => Some(format!("Build variable {name} is not set, skipping cleanup")),
    }
}

fn clean_roots<R: CommandRunner, L: BuildListener>(
    mut report: CleanupReport,
    roots: &[WorkspaceRoot],
    spec: &CleanupSpec,
    runner: &R,
    listener: &L,
    engine: &EngineConfig,
) -> CleanupReport {
    let mode = match &spec.external_command {
        Some(template) => DeleteMode::External {
            template: template.clone(),
            on_missing: spec.external_on_missing,
            timeout: engine.command_timeout(),
            output_limit_bytes: engine.output_limit_bytes,
        },
        None => DeleteMode::Native,
    };
    let executor = DeletionExecutor {
        mode: &mode,
        delete_emptied_dirs: spec.delete_dirs,
        runner,
        listener,
    };

    for root in roots {
        let (root_report, pending) = clean_root(root, spec, &executor);
        report.roots.push(root_report);
        report.pending.extend(pending);
    }

    let (mut deleted, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for result in report.results() {
        match result.outcome {
            PathOutcome::Deleted => deleted += 1,
            PathOutcome::Skipped(_) => skipped += 1,
            PathOutcome::Failed(_) => failed += 1,
        }
    }
    info!(deleted, skipped, failed, roots = roots.len(), "cleanup finished");
    listener.log(&format!(
        "Cleanup done: {deleted} deleted, {skipped} skipped, {failed} failed"
    ));
    report
}

fn clean_root<R: CommandRunner, L: BuildListener>(
    root: &WorkspaceRoot,
    spec: &CleanupSpec,
    executor: &DeletionExecutor<'_, R, L>,
) -> (RootReport, Option<PendingWipeout>) {
    let listener = executor.listener;
    let mut report = RootReport {
        root: root.clone(),
        missing: false,
        results: Vec::new(),
    };

    listener.log(&format!("Cleaning workspace {root}"));
    let selection = match select(root.path(), &spec.patterns) {
        Ok(Some(selection)) => selection,
        Ok(None) => {
            listener.log(&format!("Workspace {root} does not exist, nothing to clean"));
            report.missing = true;
            return (report, None);
        }
        Err(err) => {
            warn!(root = %root, err = %err, "cannot scan workspace");
            listener.log(&format!("Cannot scan workspace {root}: {err:#}"));
            report
                .results
                .push(PathResult::failed(root.path(), format!("{err:#}")));
            return (report, None);
        }
    };

    let deferrable = spec.patterns.is_full_wipe()
        && spec.external_command.is_none()
        && !spec.disable_deferred_wipeout
        && !selection.entries.is_empty();

    let mut pending = None;
    let remaining: Selection = if deferrable {
        match deferred::wipe(root.path(), &selection, listener) {
            Ok(outcome) => {
                report.results = outcome.results;
                pending = outcome.pending;
                outcome.entries_left
            }
            Err(err) => {
                debug!(err = %err, "deferred wipeout unavailable");
                listener.log(&format!(
                    "Deferred wipeout unavailable ({err:#}), deleting in place"
                ));
                selection
            }
        }
    } else {
        selection
    };

    report
        .results
        .extend(executor.delete(root.path(), &remaining));
    (report, pending)
}
