//! Durable store facade with memory-only degradation.
//!
//! Client storage is not guaranteed: private browsing blocks it, some
//! devices mount app storage read-only. When the durable backend cannot be
//! opened (or fails mid-session), the facade degrades to the in-memory
//! store so the queue stays usable for the rest of the session - just
//! without cross-restart durability. Degradation is observable via
//! [`DurableStore::degraded`] so the UI can warn the user.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use super::memory::MemoryStore;
use super::sqlite::SqliteStore;
use super::traits::{ActionStore, Checkpoint, StoreError};
use crate::action::QueuedAction;

pub struct DurableStore {
    sqlite: Option<SqliteStore>,
    memory: MemoryStore,
    degraded: AtomicBool,
}

impl DurableStore {
    /// Open the durable backend at `path`, degrading to memory-only when it
    /// cannot be opened. Never fails.
    pub async fn open(path: Option<&str>) -> Self {
        let (sqlite, degraded) = match path {
            Some(path) => match SqliteStore::open(path).await {
                Ok(store) => (Some(store), false),
                Err(e) => {
                    warn!(
                        error = %e,
                        path,
                        "Durable store unavailable, falling back to memory-only queue"
                    );
                    crate::metrics::set_degraded(true);
                    (None, true)
                }
            },
            // Memory-only by configuration is not a degradation.
            None => (None, false),
        };

        Self {
            sqlite,
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(degraded),
        }
    }

    /// Memory-only store, used in tests and by hosts that manage their own
    /// persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sqlite: None,
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the store lost its durable backend and is running
    /// memory-only. Queue contents will not survive a restart.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Route an operation to sqlite if healthy, degrading on backend errors.
    /// Corruption errors are real findings, not degradation triggers, and
    /// pass through unchanged.
    fn note_failure(&self, op: &str, err: &StoreError) -> bool {
        match err {
            StoreError::Corruption { .. } => false,
            _ => {
                warn!(
                    op,
                    error = %err,
                    "Durable backend failed, degrading to memory-only queue"
                );
                self.degraded.store(true, Ordering::Release);
                crate::metrics::set_degraded(true);
                true
            }
        }
    }

    fn use_sqlite(&self) -> Option<&SqliteStore> {
        if self.degraded() {
            None
        } else {
            self.sqlite.as_ref()
        }
    }
}

#[async_trait]
impl ActionStore for DurableStore {
    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.get(id).await {
                Ok(found) => return Ok(found),
                Err(e) if !self.note_failure("get", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.get(id).await
    }

    async fn put(&self, action: &QueuedAction) -> Result<(), StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.put(action).await {
                Ok(()) => return Ok(()),
                Err(e) if !self.note_failure("put", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.put(action).await
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.remove(id).await {
                Ok(()) => return Ok(()),
                Err(e) if !self.note_failure("remove", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.remove(id).await
    }

    async fn get_all(&self) -> Result<Vec<QueuedAction>, StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.get_all().await {
                Ok(all) => return Ok(all),
                Err(e) if !self.note_failure("get_all", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.get_all().await
    }

    async fn count_active(&self) -> Result<usize, StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.count_active().await {
                Ok(count) => return Ok(count),
                Err(e) if !self.note_failure("count_active", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.count_active().await
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.save_checkpoint(checkpoint).await {
                Ok(()) => return Ok(()),
                Err(e) if !self.note_failure("save_checkpoint", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.save_checkpoint(checkpoint).await
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        if let Some(sqlite) = self.use_sqlite() {
            match sqlite.load_checkpoint().await {
                Ok(found) => return Ok(found),
                Err(e) if !self.note_failure("load_checkpoint", &e) => return Err(e),
                Err(_) => {}
            }
        }
        self.memory.load_checkpoint().await
    }
}
