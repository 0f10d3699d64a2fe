//! Walk a workspace root and apply a [`PatternSet`] to every entry.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::patterns::PatternSet;

/// An entry chosen for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEntry {
    /// Absolute (root-joined) path.
    pub path: PathBuf,
    /// `/`-separated path relative to the root.
    pub relative: String,
    pub is_dir: bool,
}

/// Entries to remove from one root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Minimal removal set: fully selected directories stand in for their contents.
    pub entries: Vec<SelectedEntry>,
    /// Directories kept in place that contain removed entries, deepest first.
    pub emptied: Vec<PathBuf>,
    /// Entries that could not be listed.
    pub errors: Vec<(PathBuf, String)>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }
}

/// Per-directory bookkeeping while walking contents-first.
#[derive(Debug)]
struct DirTally {
    /// Every child was selected (vacuously true for an empty directory).
    all_selected: bool,
    /// Some descendant will be removed.
    any_selected: bool,
    picked: Vec<SelectedEntry>,
}

impl Default for DirTally {
    fn default() -> Self {
        Self {
            all_selected: true,
            any_selected: false,
            picked: Vec::new(),
        }
    }
}

/// Select entries under `root`.
///
/// Returns `Ok(None)` when the root does not exist (already removed, trivially clean).
/// The root itself is never part of the selection. A root that is a symlink to a
/// directory is followed; links below it are not.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn select(root: &Path, patterns: &PatternSet) -> Result<Option<Selection>> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => bail!("workspace root {} is not a directory", root.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("workspace root missing, nothing to select");
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("stat workspace root {}", root.display()));
        }
    }

    let mut tallies: HashMap<PathBuf, DirTally> = HashMap::new();
    let mut emptied = Vec::new();
    let mut errors = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
        .sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let vanished = err
                    .io_error()
                    .is_some_and(|io| io.kind() == ErrorKind::NotFound);
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                if vanished {
                    debug!(path = %path.display(), "entry vanished during scan");
                    continue;
                }
                warn!(path = %path.display(), err = %err, "cannot list entry");
                if let Some(parent) = path.parent() {
                    tallies.entry(parent.to_path_buf()).or_default().all_selected = false;
                }
                errors.push((path, format!("cannot list: {err}")));
                continue;
            }
        };

        let path = entry.path().to_path_buf();
        let relative = relative_path(root, &path)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        let verdict = patterns.is_selected(&relative);

        if entry.file_type().is_dir() {
            let own = tallies.remove(&path).unwrap_or_default();
            let parent_tally = tallies.entry(parent).or_default();
            if verdict && own.all_selected {
                parent_tally.any_selected = true;
                parent_tally.picked.push(SelectedEntry {
                    path,
                    relative,
                    is_dir: true,
                });
            } else {
                parent_tally.all_selected = false;
                if own.any_selected {
                    parent_tally.any_selected = true;
                    parent_tally.picked.extend(own.picked);
                    emptied.push(path);
                }
            }
        } else {
            let parent_tally = tallies.entry(parent).or_default();
            if verdict {
                parent_tally.any_selected = true;
                parent_tally.picked.push(SelectedEntry {
                    path,
                    relative,
                    is_dir: false,
                });
            } else {
                parent_tally.all_selected = false;
            }
        }
    }

    let entries = tallies.remove(root).map(|t| t.picked).unwrap_or_default();
    debug!(
        selected = entries.len(),
        emptied = emptied.len(),
        errors = errors.len(),
        "selection complete"
    );
    Ok(Some(Selection {
        entries,
        emptied,
        errors,
    }))
}

/// Render `path` relative to `root` with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}
