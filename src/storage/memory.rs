use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{ActionStore, Checkpoint, StoreError};
use crate::action::QueuedAction;

/// In-memory store: the session-only fallback and the test backend.
///
/// The checkpoint lives in a separate cell from the action map, mirroring
/// real client storage where the small checkpoint record and the bulk action
/// log have different eviction behavior. Wiping the map without touching the
/// checkpoint is exactly the eviction scenario the loss detector exists for.
pub struct MemoryStore {
    actions: DashMap<String, QueuedAction>,
    checkpoint: RwLock<Option<Checkpoint>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: DashMap::new(),
            checkpoint: RwLock::new(None),
        }
    }

    /// Get current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drop all action entries, leaving the checkpoint in place.
    ///
    /// This simulates storage eviction in tests; production code never
    /// calls it.
    pub fn clear_actions(&self) {
        self.actions.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, StoreError> {
        Ok(self.actions.get(id).map(|r| r.value().clone()))
    }

    async fn put(&self, action: &QueuedAction) -> Result<(), StoreError> {
        self.actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.actions.remove(id);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedAction>, StoreError> {
        let mut all: Vec<QueuedAction> =
            self.actions.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(QueuedAction::sort_key);
        Ok(all)
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        *self.checkpoint.write() = Some(checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoint.read().clone())
    }
}
