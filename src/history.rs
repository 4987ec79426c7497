//! Capped scan-history store owned by the background relay.

use crate::analysis::ScanResult;
use crate::classifier::ListingUrl;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum number of retained scan records; older entries are evicted.
pub const HISTORY_CAPACITY: usize = 100;

/// One completed scan, as stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Listing the scan was run against.
    pub url: ListingUrl,
    /// Verdict returned by the scanning service.
    pub result: ScanResult,
    /// Completion time, epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_epoch_ms: u64,
}

/// Errors surfaced while loading or persisting history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Reading or writing the backing file failed.
    #[error("history file io: {0}")]
    Io(#[from] std::io::Error),
    /// The backing file held malformed JSON.
    #[error("history file decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Most-recent-first scan history, capped at [`HISTORY_CAPACITY`] entries.
#[derive(Debug, Default, Clone)]
pub struct HistoryStore {
    entries: VecDeque<ScanRecord>,
}

impl HistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a record, evicting the oldest entry past capacity.
    pub fn push(&mut self, record: ScanRecord) {
        self.entries.push_front(record);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no scans have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones the retained records, most recent first.
    pub fn snapshot(&self) -> Vec<ScanRecord> {
        self.entries.iter().cloned().collect()
    }

    /// Loads a store previously written by [`HistoryStore::persist`].
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<ScanRecord> = serde_json::from_str(&raw)?;
        let mut entries: VecDeque<ScanRecord> = records.into();
        entries.truncate(HISTORY_CAPACITY);
        Ok(Self { entries })
    }

    /// Writes the retained records to `path` as JSON, most recent first.
    pub fn persist(&self, path: &Path) -> Result<(), HistoryError> {
        let records = self.snapshot();
        std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
        Ok(())
    }
}

/// Current time as epoch milliseconds.
pub fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}
