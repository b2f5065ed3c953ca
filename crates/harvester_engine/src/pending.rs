use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use engine_logging::engine_warn;
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("pending ledger {path:?} has no file name")]
    InvalidPath { path: PathBuf },
    #[error("failed to write pending ledger: {0}")]
    Write(#[from] PersistError),
}

/// Durable set of labels that were resolved but not yet confirmed at the sink.
///
/// Stored as a JSON array, oldest first. Every mutation is a locked
/// read-modify-write of the whole file, so the pipeline and the persistence
/// worker may share one ledger. The lock guards no data; a poisoned lock is
/// recovered.
#[derive(Debug)]
pub struct PendingLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PendingLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current labels, oldest first. Missing or corrupt files read as empty.
    pub fn load(&self) -> Vec<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        read_labels(&self.path)
    }

    /// Adds `label` if absent. Returns whether the file changed.
    pub fn add(&self, label: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut labels = read_labels(&self.path);
        if labels.iter().any(|l| l == label) {
            return Ok(false);
        }
        labels.push(label.to_string());
        self.write_labels(&labels)?;
        Ok(true)
    }

    /// Removes `label` if present. Returns whether the file changed.
    pub fn remove(&self, label: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut labels = read_labels(&self.path);
        let before = labels.len();
        labels.retain(|l| l != label);
        if labels.len() == before {
            return Ok(false);
        }
        self.write_labels(&labels)?;
        Ok(true)
    }

    fn write_labels(&self, labels: &[String]) -> Result<(), LedgerError> {
        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| LedgerError::InvalidPath {
                path: self.path.clone(),
            })?;
        AtomicFileWriter::for_file(&self.path).write_json(filename, labels)?;
        Ok(())
    }
}

fn read_labels(path: &Path) -> Vec<String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            engine_warn!("Failed to read pending ledger {:?}: {}", path, err);
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(&text) {
        Ok(labels) => dedupe(labels),
        Err(err) => {
            engine_warn!("Pending ledger {:?} is corrupt, treating as empty: {}", path, err);
            Vec::new()
        }
    }
}

fn dedupe(labels: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    labels
        .into_iter()
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn poisoned_lock_does_not_block_mutations() {
        let temp = TempDir::new().unwrap();
        let ledger = PendingLedger::new(temp.path().join("pending.json"));
        ledger.add("w0").unwrap();

        let _ = std::panic::catch_unwind(|| {
            let _guard = ledger.lock.lock().unwrap();
            panic!("writer died holding the ledger lock");
        });
        assert!(ledger.lock.is_poisoned());

        assert!(ledger.add("w1").unwrap());
        assert!(ledger.remove("w0").unwrap());
        assert_eq!(ledger.load(), vec!["w1"]);
    }
}
