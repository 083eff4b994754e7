//! Public types for the sync engine.

/// Result of one drain, partitioned by outcome.
///
/// The three lists are disjoint: every active action the drain touched
/// lands in exactly one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Actions that completed and were removed from the store.
    pub success: Vec<String>,
    /// Actions that hit a retryable error and remain queued.
    pub failed: Vec<String>,
    /// Actions the executor rejected semantically (or that exhausted their
    /// retry budget); parked until the user dismisses or retries them.
    pub conflicts: Vec<String>,
}

impl SyncResult {
    /// Total number of actions this drain touched.
    #[must_use]
    pub fn total(&self) -> usize {
        self.success.len() + self.failed.len() + self.conflicts.len()
    }

    /// Whether the drain touched nothing (empty queue, or a re-entrant call
    /// that was ignored).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Whether everything touched succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.conflicts.is_empty()
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SyncResult(success={}, failed={}, conflicts={})",
            self.success.len(),
            self.failed.len(),
            self.conflicts.len()
        )
    }
}
