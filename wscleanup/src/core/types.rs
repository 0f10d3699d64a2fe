//! Shared deterministic types for the cleanup core.
//!
//! These types define the contracts between the engine and the job runner.
//! They carry no I/O handles; a [`WorkspaceRoot`] is only an address.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::LifecycleError;
use crate::core::lifecycle::BuildPhase;
use crate::core::patterns::PatternSet;
use crate::core::template::CommandTemplate;

/// Terminal status of a build, as computed by the job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 5] = [
        BuildStatus::Success,
        BuildStatus::Unstable,
        BuildStatus::Failure,
        BuildStatus::Aborted,
        BuildStatus::NotBuilt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::Unstable => "unstable",
            BuildStatus::Failure => "failure",
            BuildStatus::Aborted => "aborted",
            BuildStatus::NotBuilt => "not_built",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        BuildStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown build status '{s}' (expected success, unstable, failure, aborted or not_built)"
                )
            })
    }
}

/// Whether a glob rule adds or removes paths from the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Include,
    Exclude,
}

/// One ordered selection rule. Later rules override earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
}

impl PatternRule {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Include,
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Exclude,
        }
    }
}

/// What external-command mode does with an entry that vanished before its turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTargetPolicy {
    /// Report `Skipped` without running the command.
    #[default]
    Skip,
    /// Run the command anyway; its exit status decides.
    Run,
}

/// Validated cleanup configuration for one invocation point.
#[derive(Debug, Clone)]
pub struct CleanupSpec {
    pub patterns: PatternSet,
    /// Remove directories left empty by the removal of their contents.
    pub delete_dirs: bool,
    /// Replaces native deletion for every selected entry when present.
    pub external_command: Option<CommandTemplate>,
    pub disable_deferred_wipeout: bool,
    /// Build variable that must be `true` for cleanup to run.
    pub cleanup_parameter: Option<String>,
    pub external_on_missing: MissingTargetPolicy,
}

impl Default for CleanupSpec {
    /// Whole-tree wipe with native deletion.
    fn default() -> Self {
        Self {
            patterns: PatternSet::everything(),
            delete_dirs: false,
            external_command: None,
            disable_deferred_wipeout: false,
            cleanup_parameter: None,
            external_on_missing: MissingTargetPolicy::Skip,
        }
    }
}

/// Post-build gating and escalation flags.
///
/// All flags default to `false`: an unset policy never fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeFlags {
    pub on_success: bool,
    pub on_unstable: bool,
    pub on_failure: bool,
    pub on_not_built: bool,
    pub on_aborted: bool,
    /// Matrix children also clean the parent build's shared workspace.
    pub cleanup_matrix_parent: bool,
    /// Escalate per-path failures to a build failure.
    pub fail_build_on_cleanup_error: bool,
}

impl OutcomeFlags {
    /// Flags that fire for every terminal status.
    pub fn always() -> Self {
        Self {
            on_success: true,
            on_unstable: true,
            on_failure: true,
            on_not_built: true,
            on_aborted: true,
            ..Self::default()
        }
    }
}

/// Address of a build's workspace directory. Borrowed from the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkspaceRoot(PathBuf);

impl WorkspaceRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for WorkspaceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Stored reference from a matrix child to its parent build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentRef(String);

impl ParentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a build within a matrix build, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixRole {
    /// Ordinary single build.
    Standalone,
    /// Coordinating run of a matrix build.
    Parent,
    /// Axis run of a matrix build.
    Child { parent: ParentRef },
}

/// One build execution, as seen by the cleanup engine.
///
/// Created per build and discarded once post-build cleanup completes.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Display name used in logs (e.g. `app#12` or `app/axis=a#12`).
    pub id: String,
    /// `None` when the runner never allocated or already released the workspace.
    pub workspace: Option<WorkspaceRoot>,
    pub matrix_role: MatrixRole,
    /// Build variables, consulted by `cleanup_parameter`.
    pub env: BTreeMap<String, String>,
    phase: BuildPhase,
}

impl BuildContext {
    pub fn new(id: impl Into<String>, workspace: Option<WorkspaceRoot>) -> Self {
        Self {
            id: id.into(),
            workspace,
            matrix_role: MatrixRole::Standalone,
            env: BTreeMap::new(),
            phase: BuildPhase::Running,
        }
    }

    pub fn with_matrix_role(mut self, role: MatrixRole) -> Self {
        self.matrix_role = role;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn terminal_status(&self) -> Option<BuildStatus> {
        self.phase.terminal_status()
    }

    pub fn begin_steps(&mut self) -> Result<(), LifecycleError> {
        self.phase = self.phase.begin_steps()?;
        Ok(())
    }

    pub fn finish(&mut self, status: BuildStatus) -> Result<(), LifecycleError> {
        self.phase = self.phase.finish(status)?;
        Ok(())
    }

    pub(crate) fn enter_pre_build_cleanup(&mut self) -> Result<(), LifecycleError> {
        self.phase = self.phase.pre_build_cleanup()?;
        Ok(())
    }

    pub(crate) fn enter_post_build_cleanup(&mut self) -> Result<BuildStatus, LifecycleError> {
        let (status, next) = self.phase.post_build_cleanup()?;
        self.phase = next;
        Ok(status)
    }
}

/// Outcome of one deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum PathOutcome {
    Deleted,
    Skipped(String),
    Failed(String),
}

/// Per-path result reported back to the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: PathOutcome,
    /// Captured command output (external-command mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl PathResult {
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, PathOutcome::Deleted)
    }

    pub fn skipped(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(path, PathOutcome::Skipped(reason.into()))
    }

    pub fn failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::new(path, PathOutcome::Failed(reason.into()))
    }

    pub fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PathOutcome::Failed(_))
    }

    fn new(path: impl Into<PathBuf>, outcome: PathOutcome) -> Self {
        Self {
            path: path.into(),
            outcome,
            output: None,
        }
    }
}
