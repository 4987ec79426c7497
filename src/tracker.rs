//! Per-session scan state tracking and queue gating.

use crate::analysis::ScanResult;
use crate::classifier::ListingUrl;
use std::collections::HashMap;

/// Lifecycle of one listing's scan within a session.
///
/// A listing the tracker has never seen is *unseen*, represented by absence
/// from the map. Completed and failed states are terminal: the same session
/// never re-queues them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    /// A scan request is in flight.
    Queued,
    /// The relay returned a verdict.
    Completed(ScanResult),
    /// The relay reported a failure; the reason is kept for the report.
    Failed(String),
}

/// Tracks scan state per listing URL.
///
/// Owned exclusively by one page session and rebuilt, never merged, when a
/// navigation creates a fresh session.
#[derive(Debug, Default)]
pub struct ScanTracker {
    states: HashMap<ListingUrl, ScanState>,
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TrackerSummary {
    /// Scans still in flight.
    pub queued: usize,
    /// Scans that produced a verdict.
    pub completed: usize,
    /// Scans that failed.
    pub failed: usize,
}

impl ScanTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `url` is unseen and may be queued.
    pub fn should_queue(&self, url: &ListingUrl) -> bool {
        !self.states.contains_key(url)
    }

    /// Transitions `url` to queued.
    ///
    /// Calling this for a URL that is already tracked is a caller bug
    /// ([`ScanTracker::should_queue`] gates it); the tracker logs and lets
    /// the last write win rather than corrupting state.
    pub fn mark_queued(&mut self, url: ListingUrl) {
        if let Some(existing) = self.states.get(&url) {
            tracing::warn!(%url, state = ?existing, "re-queueing a tracked listing");
        }
        self.states.insert(url, ScanState::Queued);
    }

    /// Records a verdict for `url`.
    pub fn mark_completed(&mut self, url: ListingUrl, result: ScanResult) {
        self.states.insert(url, ScanState::Completed(result));
    }

    /// Records a failure for `url`.
    pub fn mark_failed(&mut self, url: ListingUrl, reason: String) {
        self.states.insert(url, ScanState::Failed(reason));
    }

    /// Current state of `url`, or `None` when unseen.
    pub fn state(&self, url: &ListingUrl) -> Option<&ScanState> {
        self.states.get(url)
    }

    /// Iterates tracked listings and their states, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&ListingUrl, &ScanState)> {
        self.states.iter()
    }

    /// Number of tracked listings.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when nothing has been tracked yet.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Aggregate counts per state.
    pub fn summary(&self) -> TrackerSummary {
        let mut summary = TrackerSummary::default();
        for state in self.states.values() {
            match state {
                ScanState::Queued => summary.queued += 1,
                ScanState::Completed(_) => summary.completed += 1,
                ScanState::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}
