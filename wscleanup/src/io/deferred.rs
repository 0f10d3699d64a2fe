//! Deferred whole-tree wipeout.
//!
//! Top-level entries are renamed into a fresh sibling directory of the root and
//! that directory is removed on a background thread, so the root is empty as
//! soon as [`wipe`] returns.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::PathResult;
use crate::io::build::BuildListener;
use crate::io::scan::Selection;

const TRASH_MARKER: &str = "_ws-cleanup_";

/// Background removal of one trash directory.
#[derive(Debug)]
pub struct PendingWipeout {
    pub trash: PathBuf,
    handle: JoinHandle<Result<()>>,
}

impl PendingWipeout {
    /// Block until the trash directory is gone.
    pub fn wait(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "background removal of {} panicked",
                self.trash.display()
            )),
        }
    }
}

/// Result of a deferred wipe. `entries_left` still need immediate deletion.
#[derive(Debug, Default)]
pub struct DeferredOutcome {
    pub results: Vec<PathResult>,
    pub entries_left: Selection,
    pub pending: Option<PendingWipeout>,
}

/// Move every selected top-level entry into a trash sibling and delete it in the background.
///
/// Returns `Err` only when the trash directory cannot be created; the caller
/// then falls back to immediate deletion of the whole selection.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn wipe<L: BuildListener>(
    root: &Path,
    selection: &Selection,
    listener: &L,
) -> Result<DeferredOutcome> {
    let trash = create_trash_dir(root)?;
    listener.log(&format!(
        "Deferred wipeout: moving contents of {} to {}",
        root.display(),
        trash.display()
    ));

    let mut outcome = DeferredOutcome::default();
    outcome.entries_left.errors = selection.errors.clone();
    for entry in &selection.entries {
        let Some(name) = entry.path.file_name() else {
            outcome.entries_left.entries.push(entry.clone());
            continue;
        };
        match fs::rename(&entry.path, trash.join(name)) {
            Ok(()) => outcome.results.push(PathResult::deleted(&entry.path)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                outcome
                    .results
                    .push(PathResult::skipped(&entry.path, "already removed"));
            }
            Err(err) => {
                debug!(path = %entry.path.display(), err = %err, "rename failed, deleting in place");
                outcome.entries_left.entries.push(entry.clone());
            }
        }
    }

    let background = trash.clone();
    let handle = thread::Builder::new()
        .name("ws-cleanup-wipeout".to_string())
        .spawn(move || remove_trash(&background))
        .context("spawn background wipeout thread");
    match handle {
        Ok(handle) => outcome.pending = Some(PendingWipeout { trash, handle }),
        Err(err) => {
            warn!(err = %err, "removing trash directory inline");
            remove_trash(&trash)?;
        }
    }
    Ok(outcome)
}

fn remove_trash(trash: &Path) -> Result<()> {
    match fs::remove_dir_all(trash) {
        Ok(()) => {
            debug!(trash = %trash.display(), "trash directory removed");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => {
            warn!(trash = %trash.display(), err = %err, "cannot remove trash directory");
            Err(err).with_context(|| format!("remove {}", trash.display()))
        }
    }
}

/// Create `<root-name>_ws-cleanup_<millis>[_n]` next to `root`.
fn create_trash_dir(root: &Path) -> Result<PathBuf> {
    let parent = root
        .parent()
        .with_context(|| format!("workspace root {} has no parent", root.display()))?;
    let name = root
        .file_name()
        .with_context(|| format!("workspace root {} has no name", root.display()))?
        .to_string_lossy();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let base = format!("{name}{TRASH_MARKER}{millis}");

    for attempt in 0..100u32 {
        let candidate = if attempt == 0 {
            parent.join(&base)
        } else {
            parent.join(format!("{base}_{attempt}"))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("create trash directory {}", candidate.display()));
            }
        }
    }
    Err(anyhow!("no free trash directory name next to {}", root.display()))
}
