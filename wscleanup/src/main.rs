//! `wscleanup` command-line entry point.
//!
//! Runs one cleanup invocation point for a build whose workspace lives on the
//! local filesystem. Build-log lines go to stdout, diagnostics to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use wscleanup::cleanup::{
    BuildEffect, CleanupReport, run_post_build_cleanup, run_pre_build_cleanup,
};
use wscleanup::core::types::{BuildContext, BuildStatus, MatrixRole, ParentRef, WorkspaceRoot};
use wscleanup::exit_codes;
use wscleanup::io::build::{ConsoleListener, FixedParent, NoParents};
use wscleanup::io::config::{CompiledConfig, load_config};
use wscleanup::io::process::ProcessRunner;
use wscleanup::logging;

/// Id under which `--parent-workspace` is registered for matrix children.
const PARENT_ID: &str = "parent";

#[derive(Parser)]
#[command(
    name = "wscleanup",
    version,
    about = "Delete build workspace contents before or after a CI build"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and compile a job configuration without touching any workspace.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Clean the workspace before build steps run.
    PreBuild(BuildArgs),
    /// Clean after the build finished with `--status`.
    PostBuild {
        #[command(flatten)]
        build: BuildArgs,
        /// Terminal status: success, unstable, failure, aborted or not_built.
        #[arg(long)]
        status: BuildStatus,
        /// Shared workspace of the matrix parent; makes this build a matrix child.
        #[arg(long, conflicts_with = "matrix_parent")]
        parent_workspace: Option<PathBuf>,
        /// This build is a matrix parent.
        #[arg(long)]
        matrix_parent: bool,
    },
}

#[derive(Args)]
struct BuildArgs {
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    workspace: PathBuf,
    /// Build variable, repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    env: Vec<(String, String)>,
    /// Print the cleanup report as JSON after the build log.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Exit code 2 is reserved for build failures.
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Validate { config } => cmd_validate(&config),
        Command::PreBuild(args) => cmd_pre_build(&args),
        Command::PostBuild {
            build,
            status,
            parent_workspace,
            matrix_parent,
        } => cmd_post_build(&build, status, parent_workspace, matrix_parent),
    }
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let compiled = load_compiled(path)?;
    if let Some((_, flags)) = &compiled.post_build
        && !(flags.on_success
            || flags.on_unstable
            || flags.on_failure
            || flags.on_not_built
            || flags.on_aborted)
    {
        eprintln!("warning: [post_build] has no clean_when status enabled and will never run");
    }
    println!("ok");
    Ok(exit_codes::OK)
}

fn cmd_pre_build(args: &BuildArgs) -> Result<i32> {
    let compiled = load_compiled(&args.config)?;
    let Some(spec) = &compiled.pre_build else {
        debug!("no [pre_build] section, nothing to do");
        return Ok(exit_codes::OK);
    };
    let mut context = build_context(args, MatrixRole::Standalone);
    let listener = ConsoleListener::default();
    let report = run_pre_build_cleanup(
        spec,
        &mut context,
        &ProcessRunner,
        &listener,
        &compiled.engine,
    )?;
    finish(report, args.json)
}

fn cmd_post_build(
    args: &BuildArgs,
    status: BuildStatus,
    parent_workspace: Option<PathBuf>,
    matrix_parent: bool,
) -> Result<i32> {
    let compiled = load_compiled(&args.config)?;
    let Some((spec, flags)) = &compiled.post_build else {
        debug!("no [post_build] section, nothing to do");
        return Ok(exit_codes::OK);
    };
    let role = match (&parent_workspace, matrix_parent) {
        (Some(_), _) => MatrixRole::Child {
            parent: ParentRef::new(PARENT_ID),
        },
        (None, true) => MatrixRole::Parent,
        (None, false) => MatrixRole::Standalone,
    };
    let mut context = build_context(args, role);
    context.finish(status).context("record build status")?;

    let listener = ConsoleListener::default();
    let report = match parent_workspace {
        Some(parent) => run_post_build_cleanup(
            spec,
            flags,
            &mut context,
            &ProcessRunner,
            &listener,
            &FixedParent(WorkspaceRoot::new(parent)),
            &compiled.engine,
        )?,
        None => run_post_build_cleanup(
            spec,
            flags,
            &mut context,
            &ProcessRunner,
            &listener,
            &NoParents,
            &compiled.engine,
        )?,
    };
    finish(report, args.json)
}

fn load_compiled(path: &Path) -> Result<CompiledConfig> {
    if !path.exists() {
        bail!("config file {} does not exist", path.display());
    }
    load_config(path)?
        .compile()
        .with_context(|| format!("compile {}", path.display()))
}

fn build_context(args: &BuildArgs, role: MatrixRole) -> BuildContext {
    let id = args
        .workspace
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.workspace.display().to_string());
    let mut context =
        BuildContext::new(id, Some(WorkspaceRoot::new(&args.workspace))).with_matrix_role(role);
    for (key, value) in &args.env {
        context = context.with_env(key, value);
    }
    context
}

/// Wait for background work, print the report, and map its effect to an exit code.
fn finish(mut report: CleanupReport, json: bool) -> Result<i32> {
    report.wait_for_deferred()?;
    if json {
        let payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{payload}");
    }
    Ok(match report.effect {
        BuildEffect::Continue => exit_codes::OK,
        BuildEffect::FailBuild | BuildEffect::AbortBuild => exit_codes::BUILD_FAILED,
    })
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
