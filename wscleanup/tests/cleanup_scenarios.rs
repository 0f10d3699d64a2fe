//! Engine-level cleanup scenarios.
//!
//! These tests drive the pre-build and post-build entry points against real
//! directory trees: whole-tree wipes, literal command substitution, idempotent
//! re-runs, and a threaded matrix build sharing its parent's workspace.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use wscleanup::cleanup::{BuildEffect, run_post_build_cleanup, run_pre_build_cleanup};
use wscleanup::core::patterns::PatternSet;
use wscleanup::core::template::CommandTemplate;
use wscleanup::core::types::{
    BuildContext, BuildStatus, CleanupSpec, MatrixRole, OutcomeFlags, ParentRef, PathOutcome,
    PatternRule, WorkspaceRoot,
};
use wscleanup::io::build::NoParents;
use wscleanup::io::config::EngineConfig;
use wscleanup::test_support::{
    MatrixRegistry, RecordingListener, ScriptedRunner, list_tree, populate,
};

const SPECIAL_NAME: &str = "\\s! Dozen for 5$ only!";

fn native_immediate() -> CleanupSpec {
    CleanupSpec {
        disable_deferred_wipeout: true,
        ..CleanupSpec::default()
    }
}

fn finished(id: &str, root: &Path, status: BuildStatus) -> BuildContext {
    let mut ctx = BuildContext::new(id, Some(WorkspaceRoot::new(root)));
    ctx.finish(status).expect("finish");
    ctx
}

/// Pre-build wipe of `a.txt`, `b/`, `b/c.txt` leaves the root empty.
#[test]
fn pre_build_full_wipe_empties_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    populate(temp.path(), &["a.txt", "b/", "b/c.txt"]);

    let mut ctx = BuildContext::new("app#1", Some(WorkspaceRoot::new(temp.path())));
    let report = run_pre_build_cleanup(
        &native_immediate(),
        &mut ctx,
        &ScriptedRunner::default(),
        &RecordingListener::default(),
        &EngineConfig::default(),
    )
    .expect("cleanup");

    assert!(report.is_success());
    assert_eq!(report.effect, BuildEffect::Continue);
    assert!(list_tree(temp.path()).is_empty());
}

/// Full wipe copes with names that look like regex or shell syntax.
#[test]
fn full_wipe_handles_special_characters() {
    let temp = tempfile::tempdir().expect("tempdir");
    populate(
        temp.path(),
        &[SPECIAL_NAME, "dir with spaces/$1.txt", "[brackets]/*star*"],
    );

    for spec in [native_immediate(), CleanupSpec::default()] {
        let mut ctx = finished("app#1", temp.path(), BuildStatus::Success);
        let mut report = run_post_build_cleanup(
            &spec,
            &OutcomeFlags::always(),
            &mut ctx,
            &ScriptedRunner::default(),
            &RecordingListener::default(),
            &NoParents,
            &EngineConfig::default(),
        )
        .expect("cleanup");
        report.wait_for_deferred().expect("deferred");

        assert!(report.is_success());
        assert!(list_tree(temp.path()).is_empty());
        populate(temp.path(), &[SPECIAL_NAME]);
    }
}

/// `rm %s` resolves to the literal path in both the log line and the argv.
#[test]
fn external_command_substitution_is_literal() {
    let temp = tempfile::tempdir().expect("tempdir");
    populate(temp.path(), &[SPECIAL_NAME]);
    let spec = CleanupSpec {
        external_command: Some(CommandTemplate::parse("rm %s").expect("template")),
        ..CleanupSpec::default()
    };

    let runner = ScriptedRunner::deleting();
    let listener = RecordingListener::default();
    let mut ctx = finished("app#1", temp.path(), BuildStatus::Success);
    let report = run_post_build_cleanup(
        &spec,
        &OutcomeFlags::always(),
        &mut ctx,
        &runner,
        &listener,
        &NoParents,
        &EngineConfig::default(),
    )
    .expect("cleanup");

    let target = temp.path().join(SPECIAL_NAME).display().to_string();
    assert!(report.is_success());
    assert!(
        listener
            .lines()
            .contains(&format!("Using command: rm {target}"))
    );
    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].argv, vec!["rm".to_string(), target]);
    assert!(list_tree(temp.path()).is_empty());
}

/// Same substitution through a real child process.
#[cfg(unix)]
#[test]
fn external_command_runs_real_process() {
    use wscleanup::io::process::ProcessRunner;

    let temp = tempfile::tempdir().expect("tempdir");
    populate(temp.path(), &[SPECIAL_NAME, "keep.txt"]);
    let spec = CleanupSpec {
        patterns: PatternSet::compile(&[PatternRule::exclude("keep.txt")]).expect("compile"),
        external_command: Some(CommandTemplate::parse("rm %s").expect("template")),
        ..CleanupSpec::default()
    };

    let listener = RecordingListener::default();
    let mut ctx = finished("app#1", temp.path(), BuildStatus::Success);
    let report = run_post_build_cleanup(
        &spec,
        &OutcomeFlags::always(),
        &mut ctx,
        &ProcessRunner,
        &listener,
        &NoParents,
        &EngineConfig::default(),
    )
    .expect("cleanup");

    assert!(report.is_success(), "{:?}", report.roots);
    assert_eq!(list_tree(temp.path()), vec!["keep.txt"]);
    let expected = format!(
        "Using command: rm {}",
        temp.path().join(SPECIAL_NAME).display()
    );
    assert!(listener.lines().contains(&expected));
}

/// A failing external command is reported per path and captured output kept.
#[cfg(unix)]
#[test]
fn failing_real_command_reports_output() {
    use wscleanup::io::process::ProcessRunner;

    let temp = tempfile::tempdir().expect("tempdir");
    populate(temp.path(), &["a.txt"]);
    let spec = CleanupSpec {
        external_command: Some(
            CommandTemplate::parse("sh -c 'echo refusing >&2; exit 4' %s").expect("template"),
        ),
        ..CleanupSpec::default()
    };
    let flags = OutcomeFlags {
        fail_build_on_cleanup_error: true,
        ..OutcomeFlags::always()
    };

    let listener = RecordingListener::default();
    let mut ctx = finished("app#1", temp.path(), BuildStatus::Success);
    let report = run_post_build_cleanup(
        &spec,
        &flags,
        &mut ctx,
        &ProcessRunner,
        &listener,
        &NoParents,
        &EngineConfig::default(),
    )
    .expect("cleanup");

    assert_eq!(report.effect, BuildEffect::FailBuild);
    assert!(listener.build_failed());
    let failure = report.failures().next().expect("failure");
    assert_eq!(
        failure.outcome,
        PathOutcome::Failed("command exited with status 4".to_string())
    );
    assert_eq!(failure.output.as_deref(), Some("refusing\n"));
    assert_eq!(list_tree(temp.path()), vec!["a.txt"]);
}

/// Cleaning an already-empty root twice yields no failures either time.
#[test]
fn post_build_cleanup_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    for build in 1..=2 {
        let mut ctx = finished(&format!("app#{build}"), temp.path(), BuildStatus::Success);
        let report = run_post_build_cleanup(
            &native_immediate(),
            &OutcomeFlags::always(),
            &mut ctx,
            &ScriptedRunner::default(),
            &RecordingListener::default(),
            &NoParents,
            &EngineConfig::default(),
        )
        .expect("cleanup");
        assert!(report.is_success());
        assert_eq!(report.failures().count(), 0);
        assert!(report.results().next().is_none());
    }
}

/// An exclude is never overridden by removing an ancestor directory.
#[test]
fn excludes_survive_inside_cleaned_directories() {
    let temp = tempfile::tempdir().expect("tempdir");
    populate(
        temp.path(),
        &[
            "target/debug/app",
            "target/debug/.fingerprint/x",
            "target/keep.me",
            "src/lib.rs",
        ],
    );
    let spec = CleanupSpec {
        patterns: PatternSet::compile(&[
            PatternRule::include("target/**"),
            PatternRule::exclude("**/*.me"),
        ])
        .expect("compile"),
        delete_dirs: true,
        ..CleanupSpec::default()
    };

    let mut ctx = finished("app#1", temp.path(), BuildStatus::Unstable);
    let report = run_post_build_cleanup(
        &spec,
        &OutcomeFlags::always(),
        &mut ctx,
        &ScriptedRunner::default(),
        &RecordingListener::default(),
        &NoParents,
        &EngineConfig::default(),
    )
    .expect("cleanup");

    assert!(report.is_success());
    assert_eq!(
        list_tree(temp.path()),
        vec!["src", "src/lib.rs", "target", "target/keep.me"]
    );
}

/// A directory-matching include removes the whole directory, with or without `delete_dirs`.
#[test]
fn included_directory_is_removed_recursively() {
    for delete_dirs in [false, true] {
        let temp = tempfile::tempdir().expect("tempdir");
        populate(temp.path(), &["crates/a/target/debug/app", "crates/a/src/lib.rs"]);
        let spec = CleanupSpec {
            patterns: PatternSet::compile(&[PatternRule::include("**/target")]).expect("compile"),
            delete_dirs,
            ..CleanupSpec::default()
        };

        let mut ctx = finished("app#1", temp.path(), BuildStatus::Success);
        let report = run_post_build_cleanup(
            &spec,
            &OutcomeFlags::always(),
            &mut ctx,
            &ScriptedRunner::default(),
            &RecordingListener::default(),
            &NoParents,
            &EngineConfig::default(),
        )
        .expect("cleanup");

        assert!(report.is_success(), "{:?}", report.roots);
        assert_eq!(
            report.results().map(|r| r.path.clone()).collect::<Vec<_>>(),
            vec![temp.path().join("crates/a/target")]
        );
        assert_eq!(
            list_tree(temp.path()),
            vec!["crates", "crates/a", "crates/a/src", "crates/a/src/lib.rs"],
            "delete_dirs={delete_dirs}"
        );
    }
}

/// A workspace root reached through a symlink is cleaned, and the link is kept.
#[cfg(unix)]
#[test]
fn symlinked_workspace_root_is_cleaned() {
    let temp = tempfile::tempdir().expect("tempdir");
    let real = temp.path().join("real");
    populate(&real, &["a.txt", "b/c.txt"]);
    let ws = temp.path().join("ws");
    std::os::unix::fs::symlink(&real, &ws).expect("symlink");
    let flags = OutcomeFlags {
        fail_build_on_cleanup_error: true,
        ..OutcomeFlags::always()
    };

    for spec in [native_immediate(), CleanupSpec::default()] {
        let listener = RecordingListener::default();
        let mut ctx = finished("app#1", &ws, BuildStatus::Success);
        let mut report = run_post_build_cleanup(
            &spec,
            &flags,
            &mut ctx,
            &ScriptedRunner::default(),
            &listener,
            &NoParents,
            &EngineConfig::default(),
        )
        .expect("cleanup");
        report.wait_for_deferred().expect("deferred");

        assert!(report.is_success(), "{:?}", report.roots);
        assert_eq!(report.effect, BuildEffect::Continue);
        assert!(!listener.build_failed());
        assert!(list_tree(&real).is_empty());
        assert!(ws.is_dir());
        populate(&real, &["a.txt"]);
    }
}

/// Two axis children clean their own roots and the shared parent root concurrently.
#[test]
fn matrix_children_clean_shared_parent_workspace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let parent_root = temp.path().join("parent");
    populate(&parent_root, &[]);

    let registry = Arc::new(MatrixRegistry::default());
    registry.register("app#7", WorkspaceRoot::new(&parent_root));
    let flags = OutcomeFlags {
        cleanup_matrix_parent: true,
        ..OutcomeFlags::always()
    };

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|axis| {
            let child_root = temp.path().join(format!("axis-{axis}"));
            populate(&child_root, &[&format!("{axis}.out")]);
            populate(&parent_root, &[&format!("from-{axis}.out")]);
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut ctx = BuildContext::new(
                    format!("app/axis={axis}#7"),
                    Some(WorkspaceRoot::new(&child_root)),
                )
                .with_matrix_role(MatrixRole::Child {
                    parent: ParentRef::new("app#7"),
                });
                ctx.begin_steps().expect("steps");
                ctx.finish(BuildStatus::Success).expect("finish");
                let mut report = run_post_build_cleanup(
                    &CleanupSpec::default(),
                    &flags,
                    &mut ctx,
                    &ScriptedRunner::default(),
                    &RecordingListener::default(),
                    registry.as_ref(),
                    &EngineConfig::default(),
                )
                .expect("cleanup");
                report.wait_for_deferred().expect("deferred");
                assert!(report.is_success(), "{:?}", report.roots);
                child_root
            })
        })
        .collect();

    for handle in handles {
        let child_root = handle.join().expect("child thread");
        assert!(list_tree(&child_root).is_empty());
    }

    // The parent's own post-build runs independently of its children.
    let mut parent_ctx = BuildContext::new("app#7", Some(WorkspaceRoot::new(&parent_root)))
        .with_matrix_role(MatrixRole::Parent);
    parent_ctx.finish(BuildStatus::Success).expect("finish");
    let report = run_post_build_cleanup(
        &native_immediate(),
        &flags,
        &mut parent_ctx,
        &ScriptedRunner::default(),
        &RecordingListener::default(),
        registry.as_ref(),
        &EngineConfig::default(),
    )
    .expect("cleanup");
    assert!(report.is_success());
    assert!(list_tree(&parent_root).is_empty());
}

/// A child whose parent record is gone still cleans its own root.
#[test]
fn unresolvable_parent_is_not_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let child_root = temp.path().join("child");
    populate(&child_root, &["x"]);
    let registry = MatrixRegistry::default();
    registry.register("app#3", WorkspaceRoot::new(temp.path().join("parent")));
    registry.remove("app#3");

    let mut ctx = BuildContext::new("app/axis=a#3", Some(WorkspaceRoot::new(&child_root)))
        .with_matrix_role(MatrixRole::Child {
            parent: ParentRef::new("app#3"),
        });
    ctx.finish(BuildStatus::Failure).expect("finish");
    let report = run_post_build_cleanup(
        &native_immediate(),
        &OutcomeFlags {
            cleanup_matrix_parent: true,
            ..OutcomeFlags::always()
        },
        &mut ctx,
        &ScriptedRunner::default(),
        &RecordingListener::default(),
        &registry,
        &EngineConfig::default(),
    )
    .expect("cleanup");

    assert!(report.is_success());
    assert_eq!(report.roots.len(), 1);
    assert!(list_tree(&child_root).is_empty());
}
