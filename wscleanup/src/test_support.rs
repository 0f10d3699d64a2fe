//! Test-only helpers: workspace trees and scripted job-runner collaborators.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use walkdir::WalkDir;

use crate::core::types::{ParentRef, WorkspaceRoot};
use crate::io::build::{BuildListener, ParentResolver};
use crate::io::process::{CommandOutput, CommandRequest, CommandRunner};
use crate::io::scan::relative_path;

/// Create files under `root` (parents included). Entries ending in `/` are directories.
pub fn populate(root: &Path, entries: &[&str]) {
    fs::create_dir_all(root).expect("create root");
    for entry in entries {
        if let Some(dir) = entry.strip_suffix('/') {
            fs::create_dir_all(root.join(dir)).expect("create dir");
            continue;
        }
        let path = root.join(entry);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, entry.as_bytes()).expect("write file");
    }
}

/// Every entry under `root` as sorted `/`-separated relative paths (root excluded).
pub fn list_tree(root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            let entry = entry.expect("walk entry");
            relative_path(root, entry.path()).expect("relative path")
        })
        .collect();
    entries.sort();
    entries
}

/// Listener that records build-log lines in memory.
#[derive(Debug, Default)]
pub struct RecordingListener {
    lines: Mutex<Vec<String>>,
    failed: AtomicBool,
}

impl RecordingListener {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lines lock").clone()
    }

    pub fn build_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl BuildListener for RecordingListener {
    fn log(&self, line: &str) {
        self.lines.lock().expect("lines lock").push(line.to_string());
    }

    fn mark_build_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Script {
    /// Succeed without touching the filesystem.
    #[default]
    Succeed,
    /// Remove the last argument, then succeed.
    Delete,
    /// Exit with the given code.
    Fail(i32),
}

/// Command runner returning scripted results and recording every request.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Script,
    stderr: String,
    requests: Mutex<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    /// Behaves like `rm -rf` on the last argument.
    pub fn deleting() -> Self {
        Self {
            script: Script::Delete,
            ..Self::default()
        }
    }

    pub fn failing(exit_code: i32, stderr: &str) -> Self {
        Self {
            script: Script::Fail(exit_code),
            stderr: stderr.to_string(),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let exit_code = match self.script {
            Script::Succeed => 0,
            Script::Delete => {
                if let Some(target) = request.argv.last() {
                    let target = Path::new(target);
                    match fs::symlink_metadata(target) {
                        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target)?,
                        Ok(_) => fs::remove_file(target)?,
                        Err(_) => {}
                    }
                }
                0
            }
            Script::Fail(code) => code,
        };
        Ok(CommandOutput {
            exit_code: Some(exit_code),
            stderr: self.stderr.clone().into_bytes(),
            ..CommandOutput::default()
        })
    }
}

/// Parent builds by id, for matrix scenarios.
#[derive(Debug, Default)]
pub struct MatrixRegistry {
    parents: Mutex<HashMap<String, WorkspaceRoot>>,
}

impl MatrixRegistry {
    pub fn register(&self, id: &str, root: WorkspaceRoot) {
        self.parents
            .lock()
            .expect("registry lock")
            .insert(id.to_string(), root);
    }

    /// Forget a parent, as when its build record is deleted.
    pub fn remove(&self, id: &str) {
        self.parents.lock().expect("registry lock").remove(id);
    }
}

impl ParentResolver for MatrixRegistry {
    fn parent_workspace(&self, parent: &ParentRef) -> Option<WorkspaceRoot> {
        self.parents
            .lock()
            .expect("registry lock")
            .get(parent.as_str())
            .cloned()
    }
}
