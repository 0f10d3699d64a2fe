//! Job cleanup configuration (TOML).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::patterns::PatternSet;
use crate::core::template::CommandTemplate;
use crate::core::types::{CleanupSpec, MissingTargetPolicy, OutcomeFlags, PatternRule};

/// Cleanup configuration attached to a job.
///
/// Missing sections mean "not configured": a job without `[pre_build]` never
/// cleans before its steps, a job without `[post_build]` never cleans after.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JobConfig {
    pub engine: EngineConfig,
    pub pre_build: Option<CleanupSettings>,
    pub post_build: Option<PostBuildSettings>,
}

/// Limits applied to external delete commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-command wall-clock limit in seconds. `0` disables the limit.
    pub command_timeout_secs: u64,

    /// Truncate captured command stdout/stderr beyond this many bytes each.
    pub output_limit_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 0,
            output_limit_bytes: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

/// Settings shared by both invocation points.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupSettings {
    /// Ordered rules; empty wipes the whole workspace.
    pub patterns: Vec<PatternRule>,
    pub delete_dirs: bool,
    /// Command template, e.g. `rm -rf %s`.
    pub external_delete: Option<String>,
    pub disable_deferred_wipeout: bool,
    pub cleanup_parameter: Option<String>,
    pub external_on_missing: MissingTargetPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostBuildSettings {
    #[serde(flatten)]
    pub cleanup: CleanupSettings,
    pub clean_when: CleanWhen,
    pub cleanup_matrix_parent: bool,
    /// Mark the build failed when any path cannot be removed.
    pub fail_build: bool,
}

/// Terminal statuses that trigger post-build cleanup. Unset statuses never do.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanWhen {
    pub success: bool,
    pub unstable: bool,
    pub failure: bool,
    pub not_built: bool,
    pub aborted: bool,
}

impl CleanupSettings {
    /// Validate and compile into an executable [`CleanupSpec`].
    pub fn compile(&self) -> Result<CleanupSpec, ConfigError> {
        let patterns = PatternSet::compile(&self.patterns)?;
        let external_command = self
            .external_delete
            .as_deref()
            .map(CommandTemplate::parse)
            .transpose()?;
        Ok(CleanupSpec {
            patterns,
            delete_dirs: self.delete_dirs,
            external_command,
            disable_deferred_wipeout: self.disable_deferred_wipeout,
            cleanup_parameter: self
                .cleanup_parameter
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            external_on_missing: self.external_on_missing,
        })
    }
}

impl PostBuildSettings {
    pub fn outcome_flags(&self) -> OutcomeFlags {
        OutcomeFlags {
            on_success: self.clean_when.success,
            on_unstable: self.clean_when.unstable,
            on_failure: self.clean_when.failure,
            on_not_built: self.clean_when.not_built,
            on_aborted: self.clean_when.aborted,
            cleanup_matrix_parent: self.cleanup_matrix_parent,
            fail_build_on_cleanup_error: self.fail_build,
        }
    }
}

/// Compiled configuration, ready for the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CompiledConfig {
    pub engine: EngineConfig,
    pub pre_build: Option<CleanupSpec>,
    pub post_build: Option<(CleanupSpec, OutcomeFlags)>,
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn compile(&self) -> Result<CompiledConfig> {
        self.validate()?;
        let pre_build = self
            .pre_build
            .as_ref()
            .map(CleanupSettings::compile)
            .transpose()
            .context("invalid [pre_build] settings")?;
        let post_build = self
            .post_build
            .as_ref()
            .map(|post| post.cleanup.compile().map(|spec| (spec, post.outcome_flags())))
            .transpose()
            .context("invalid [post_build] settings")?;
        Ok(CompiledConfig {
            engine: self.engine.clone(),
            pre_build,
            post_build,
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `JobConfig::default()` (no cleanup configured).
pub fn load_config(path: &Path) -> Result<JobConfig> {
    if !path.exists() {
        let cfg = JobConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: JobConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
