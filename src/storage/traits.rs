use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::QueuedAction;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("Payload corruption detected for '{id}': expected hash {expected}, got {actual}")]
    Corruption {
        id: String,
        expected: String,
        actual: String,
    },
}

/// Persisted record of the action ids the store is expected to contain.
///
/// Every mutation that goes through the queue/engine API rewrites this
/// checkpoint. Entries that vanish from the store without a matching
/// checkpoint update were evicted out-of-band - that delta is what
/// [`crate::loss::detect_loss`] reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Ids of every action the store should currently hold.
    pub expected: Vec<String>,
    /// When the checkpoint was written (epoch millis).
    pub recorded_at: i64,
}

impl Checkpoint {
    #[must_use]
    pub fn new(expected: Vec<String>) -> Self {
        Self {
            expected,
            recorded_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
        }
    }
}

/// Persistence contract for queued actions.
///
/// Backends must be safe for concurrent access and must keep the checkpoint
/// in storage that survives alongside the action records (it is the loss
/// detector's reference point, not a cache).
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, StoreError>;

    /// Insert or overwrite by id.
    async fn put(&self, action: &QueuedAction) -> Result<(), StoreError>;

    /// Delete a single entry. Not an error if absent.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// All entries ordered by `(created_at, seq)` ascending - FIFO drain order.
    async fn get_all(&self) -> Result<Vec<QueuedAction>, StoreError>;

    /// Number of entries in the active set (`pending`, `syncing`, `failed`).
    async fn count_active(&self) -> Result<usize, StoreError> {
        Ok(self
            .get_all()
            .await?
            .iter()
            .filter(|a| a.status.is_active())
            .count())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError>;
}
