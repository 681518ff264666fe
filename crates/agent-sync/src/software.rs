//! Software inventory deltas and the persisted snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Packages installed and uninstalled between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftwareDiff {
    pub installed: Vec<String>,
    pub uninstalled: Vec<String>,
}

impl SoftwareDiff {
    /// Set difference of two snapshots.
    ///
    /// `installed` keeps the order of `after`, `uninstalled` the order of
    /// `before`.
    pub fn between(before: &[String], after: &[String]) -> Self {
        let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
        let after_set: HashSet<&str> = after.iter().map(String::as_str).collect();

        Self {
            installed: unique(after.iter().filter(|p| !before_set.contains(p.as_str()))),
            uninstalled: unique(before.iter().filter(|p| !after_set.contains(p.as_str()))),
        }
    }

    /// No package changed.
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.uninstalled.is_empty()
    }
}

fn unique<'a>(packages: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    packages
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}

/// Accumulated software changes of one run, uploaded with the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareHistory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uninstalled: Vec<String>,
}

impl SoftwareHistory {
    /// Add the entries of `diff` not already present.
    pub fn merge(&mut self, diff: SoftwareDiff) {
        extend_unique(&mut self.installed, diff.installed);
        extend_unique(&mut self.uninstalled, diff.uninstalled);
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.uninstalled.is_empty()
    }
}

impl From<SoftwareDiff> for SoftwareHistory {
    fn from(diff: SoftwareDiff) -> Self {
        Self {
            installed: diff.installed,
            uninstalled: diff.uninstalled,
        }
    }
}

fn extend_unique(list: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

/// Software snapshot of the last successful upload, one package per line.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted snapshot, `None` when missing or empty.
    pub fn load(&self) -> io::Result<Option<Vec<String>>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(text.lines().map(str::to_string).collect()))
    }

    /// Atomically replace the snapshot with `packages`.
    pub fn persist(&self, packages: &[String]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(packages.join("\n").as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Changes since the persisted snapshot. Empty when there is none.
    pub fn history(&self, current: &[String]) -> SoftwareHistory {
        match self.load() {
            Ok(Some(previous)) => {
                let diff = SoftwareDiff::between(&previous, current);
                if !diff.is_empty() {
                    log::debug!("Software changed since last upload: {diff:?}");
                }
                diff.into()
            }
            Ok(None) => SoftwareHistory::default(),
            Err(e) => {
                log::warn!("Failed to read {}: {e}", self.path.display());
                SoftwareHistory::default()
            }
        }
    }
}
