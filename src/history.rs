// ===============================
// src/history.rs
// ===============================
//
// Durable submission log, keyed by a single file path. Append rewrites the
// whole document (single-user store, no partial-append protocol). Reads
// tolerate the older record shape that carried a bare `fundName` string;
// writes are always the canonical `funds` array shape.
//
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Fund, Investment};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history io: {0}")]
    Io(#[from] std::io::Error),
    #[error("history encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Injected persistence capability for the form controller. Access is
/// synchronous from the caller's perspective (local read/write).
pub trait HistoryStore {
    /// Full ordered log, oldest first.
    fn load(&self) -> Vec<Investment>;
    /// Appends one record and returns the full updated sequence.
    fn append(&mut self, record: Investment) -> Result<Vec<Investment>, StoreError>;
}

/// Accepts both persisted shapes: canonical `funds` array and the legacy
/// single `fundName` string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    amount: String,
    timestamp: String,
    #[serde(default)]
    funds: Option<Vec<Fund>>,
    #[serde(default)]
    fund_name: Option<String>,
}

impl From<RawRecord> for Investment {
    fn from(raw: RawRecord) -> Self {
        let funds = match (raw.funds, raw.fund_name) {
            (Some(funds), _) => funds,
            // legacy records carry no fund id
            (None, Some(name)) => vec![Fund { id: String::new(), name }],
            (None, None) => Vec::new(),
        };
        Investment { amount: raw.amount, funds, timestamp: raw.timestamp }
    }
}

/// JSON-file store. The log is read once at construction; appends keep the
/// in-memory copy and the file in step.
pub struct FileStore {
    path: PathBuf,
    records: Vec<Investment>,
}

impl FileStore {
    /// An unreadable or corrupt file is never fatal at startup: it logs and
    /// starts from an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match read_records(&path) {
            Ok(records) => records,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no history file yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!(?e, path = %path.display(), "history unreadable, starting empty");
                Vec::new()
            }
        };
        FileStore { path, records }
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string(&self.records)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

impl HistoryStore for FileStore {
    fn load(&self) -> Vec<Investment> {
        self.records.clone()
    }

    fn append(&mut self, record: Investment) -> Result<Vec<Investment>, StoreError> {
        self.records.push(record);
        if let Err(e) = self.persist() {
            // roll the in-memory copy back so it keeps matching the file
            self.records.pop();
            return Err(e);
        }
        Ok(self.records.clone())
    }
}

fn read_records(path: &Path) -> Result<Vec<Investment>, StoreError> {
    let body = fs::read_to_string(path)?;
    let raw: Vec<RawRecord> = serde_json::from_str(&body)?;
    Ok(raw.into_iter().map(Investment::from).collect())
}

/// In-memory fake for tests.
#[cfg(test)]
pub struct MemStore {
    pub records: Vec<Investment>,
}

#[cfg(test)]
impl MemStore {
    pub fn new() -> Self {
        MemStore { records: Vec::new() }
    }
}

#[cfg(test)]
impl HistoryStore for MemStore {
    fn load(&self) -> Vec<Investment> {
        self.records.clone()
    }

    fn append(&mut self, record: Investment) -> Result<Vec<Investment>, StoreError> {
        self.records.push(record);
        Ok(self.records.clone())
    }
}

/// Store whose appends always fail, for rollback tests.
#[cfg(test)]
pub struct FailStore;

#[cfg(test)]
impl HistoryStore for FailStore {
    fn load(&self) -> Vec<Investment> {
        Vec::new()
    }

    fn append(&mut self, _record: Investment) -> Result<Vec<Investment>, StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }
}
