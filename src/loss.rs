//! Storage-loss detection.
//!
//! Some mobile storage backends silently evict data under pressure: entries
//! a user queued days ago can be gone on the next launch with no error ever
//! raised. The detector compares the persisted checkpoint (the set of ids
//! the store is expected to hold, rewritten on every legitimate mutation)
//! against what the store actually contains. Ids in the checkpoint but not
//! in the store were removed out-of-band.
//!
//! This is a heuristic safety net, not a guarantee: an eviction that takes
//! the checkpoint with it is undetectable. The comparison logic lives
//! behind this one function so it can be refined without touching the rest
//! of the engine.
//!
//! A detected loss is irrecoverable - unlike a conflict, there is nothing
//! left to retry. The user must be told to redo the lost work.

use std::collections::HashSet;

use crate::storage::traits::{ActionStore, StoreError};

/// Result of one loss probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LossReport {
    /// Whether any expected entries are missing.
    pub data_lost: bool,
    /// How many entries are missing.
    pub lost_count: usize,
    /// The missing action ids (for diagnostics; the payloads are gone).
    pub lost_ids: Vec<String>,
}

impl LossReport {
    /// Fold another report into this one (used to combine the startup probe
    /// with a periodic probe, or successive probes before acknowledgment).
    pub fn merge(&mut self, other: LossReport) {
        for id in other.lost_ids {
            if !self.lost_ids.contains(&id) {
                self.lost_ids.push(id);
            }
        }
        self.lost_count = self.lost_ids.len();
        self.data_lost = self.lost_count > 0;
    }
}

/// Compare the persisted checkpoint against live store contents.
///
/// A store with no checkpoint yet (fresh install) reports no loss.
pub async fn detect_loss(store: &dyn ActionStore) -> Result<LossReport, StoreError> {
    let Some(checkpoint) = store.load_checkpoint().await? else {
        return Ok(LossReport::default());
    };

    let present: HashSet<String> = store
        .get_all()
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();

    let lost_ids: Vec<String> = checkpoint
        .expected
        .into_iter()
        .filter(|id| !present.contains(id))
        .collect();

    Ok(LossReport {
        data_lost: !lost_ids.is_empty(),
        lost_count: lost_ids.len(),
        lost_ids,
    })
}
