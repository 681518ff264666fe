//! Durable record of the failures of a run.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "--------------------";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only error file of one command.
///
/// Each entry is a block of a separator line, a timestamp line and the
/// message, followed by a blank line. The file outlives the process so that
/// a failed run's errors reach the server on the next run.
#[derive(Debug, Clone)]
pub struct ErrorLedger {
    path: PathBuf,
}

impl ErrorLedger {
    /// Ledger backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub fn append(&self, message: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let block = format!(
            "{SEPARATOR}\n{}\n{message}\n\n",
            Local::now().format(TIMESTAMP_FORMAT)
        );
        file.write_all(block.as_bytes())
    }

    /// Append one entry, logging instead of failing.
    pub fn record(&self, message: &str) {
        log::error!("{message}");
        if let Err(e) = self.append(message) {
            log::warn!("Failed to write {}: {e}", self.path.display());
        }
    }

    /// Whole ledger content, `None` when missing or empty.
    pub fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    /// Remove every entry.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_ledger_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ErrorLedger::new(dir.path().join("sync.err"));
        assert!(ledger.is_empty());
        assert_eq!(ledger.read().unwrap(), None);
        ledger.clear().unwrap();
    }

    #[test]
    fn test_append_writes_blocks() {
        let dir = TempDir::new().unwrap();
        let ledger = ErrorLedger::new(dir.path().join("tmp/sync.err"));
        ledger.append("first failure").unwrap();
        ledger.append("second failure").unwrap();

        let text = ledger.read().unwrap().unwrap();
        let blocks: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(blocks.len(), 2);

        let lines: Vec<&str> = blocks[0].lines().collect();
        assert_eq!(lines[0], SEPARATOR);
        assert!(chrono::NaiveDateTime::parse_from_str(lines[1], TIMESTAMP_FORMAT).is_ok());
        assert_eq!(lines[2], "first failure");
        assert!(blocks[1].ends_with("second failure"));
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = TempDir::new().unwrap();
        let ledger = ErrorLedger::new(dir.path().join("sync.err"));
        ledger.record("failure");
        assert!(!ledger.is_empty());
        ledger.clear().unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.path().exists());
    }
}
