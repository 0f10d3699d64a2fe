//! Removing selected entries, natively or through an external command.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::template::CommandTemplate;
use crate::core::types::{MissingTargetPolicy, PathResult};
use crate::io::build::BuildListener;
use crate::io::process::{CommandRequest, CommandRunner};
use crate::io::scan::Selection;

const ALREADY_REMOVED: &str = "already removed";

/// How entries are removed.
#[derive(Debug, Clone)]
pub enum DeleteMode {
    Native,
    External {
        template: CommandTemplate,
        on_missing: MissingTargetPolicy,
        timeout: Option<Duration>,
        output_limit_bytes: usize,
    },
}

/// Removes the entries of a [`Selection`] and reports one result per attempt.
///
/// Failures never stop processing of the remaining entries.
pub struct DeletionExecutor<'a, R: CommandRunner, L: BuildListener> {
    pub mode: &'a DeleteMode,
    /// Also remove directories left empty by the removals.
    pub delete_emptied_dirs: bool,
    pub runner: &'a R,
    pub listener: &'a L,
}

impl<R: CommandRunner, L: BuildListener> DeletionExecutor<'_, R, L> {
    #[instrument(skip_all, fields(root = %root.display(), entries = selection.entries.len()))]
    pub fn delete(&self, root: &Path, selection: &Selection) -> Vec<PathResult> {
        let mut results = Vec::with_capacity(selection.entries.len());

        for (path, reason) in &selection.errors {
            self.listener
                .log(&format!("Cannot inspect {}: {reason}", path.display()));
            results.push(PathResult::failed(path, reason.clone()));
        }

        for entry in &selection.entries {
            let removal = if entry.is_dir {
                Removal::Tree
            } else {
                Removal::File
            };
            results.push(self.remove(root, &entry.path, removal));
        }

        if self.delete_emptied_dirs {
            for dir in &selection.emptied {
                if is_empty_dir(dir) {
                    results.push(self.remove(root, dir, Removal::EmptyDir));
                } else {
                    debug!(dir = %dir.display(), "directory not empty, keeping");
                }
            }
        }

        results
    }

    fn remove(&self, root: &Path, path: &Path, removal: Removal) -> PathResult {
        match self.mode {
            DeleteMode::Native => self.remove_native(path, removal),
            DeleteMode::External {
                template,
                on_missing,
                timeout,
                output_limit_bytes,
            } => {
                if *on_missing == MissingTargetPolicy::Skip && !exists(path) {
                    debug!(path = %path.display(), "target missing, not invoking command");
                    return PathResult::skipped(path, ALREADY_REMOVED);
                }
                let resolved = template.resolve(&path.to_string_lossy());
                self.listener
                    .log(&format!("Using command: {}", resolved.display));
                let request = CommandRequest {
                    argv: resolved.argv,
                    workdir: root.to_path_buf(),
                    timeout: *timeout,
                    output_limit_bytes: *output_limit_bytes,
                };
                match self.runner.run(&request) {
                    Ok(output) if output.success() => {
                        PathResult::deleted(path).with_output(output.combined())
                    }
                    Ok(output) => {
                        let reason = if output.timed_out {
                            "command timed out".to_string()
                        } else {
                            match output.exit_code {
                                Some(code) => format!("command exited with status {code}"),
                                None => "command terminated by signal".to_string(),
                            }
                        };
                        warn!(path = %path.display(), %reason, "external delete failed");
                        self.listener
                            .log(&format!("Failed to delete {}: {reason}", path.display()));
                        PathResult::failed(path, reason).with_output(output.combined())
                    }
                    Err(err) => {
                        warn!(path = %path.display(), err = %err, "external delete could not launch");
                        self.listener.log(&format!(
                            "Failed to delete {}: cannot launch command: {err:#}",
                            path.display()
                        ));
                        PathResult::failed(path, format!("cannot launch command: {err:#}"))
                    }
                }
            }
        }
    }

    fn remove_native(&self, path: &Path, removal: Removal) -> PathResult {
        self.listener.log(&format!("Deleting {}", path.display()));
        let removed = match removal {
            Removal::File => fs::remove_file(path),
            Removal::Tree => fs::remove_dir_all(path),
            Removal::EmptyDir => fs::remove_dir(path),
        };
        match removed {
            Ok(()) => PathResult::deleted(path),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "already removed");
                PathResult::skipped(path, ALREADY_REMOVED)
            }
            Err(err) => {
                warn!(path = %path.display(), err = %err, "native delete failed");
                self.listener
                    .log(&format!("Failed to delete {}: {err}", path.display()));
                PathResult::failed(path, err.to_string())
            }
        }
    }
}

/// Native removal primitive. Symlinks are removed, never followed.
#[derive(Debug, Clone, Copy)]
enum Removal {
    File,
    Tree,
    EmptyDir,
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
