// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine: drains the queue against the executor registry.
//!
//! The engine owns no background tasks and no network code of its own -
//! [`SyncEngine::sync`] is a plain async call, safe to invoke from anywhere
//! (a reconnect handler, a manual "retry now" button, a timer). Connectivity
//! awareness lives in [`crate::connectivity::ConnectivityMonitor`].
//!
//! # Delivery guarantee
//!
//! Drains are **at-least-once**: a network failure can land after the server
//! applied a mutation but before the client saw the response, in which case
//! the action stays queued and runs again. Executors must therefore be
//! idempotent - that contract is consumed here, not implemented.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use offline_queue::{
//!     ActionType, DurableStore, EventBus, ExecutionOutcome, ExecutorRegistry,
//!     QueueConfig, QueueManager, SyncEngine,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(DurableStore::in_memory());
//! let queue = Arc::new(QueueManager::open(store, EventBus::new()).await);
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register_fn(ActionType::CompleteDelivery, |_payload| async {
//!     ExecutionOutcome::Ok
//! });
//!
//! let engine = SyncEngine::new(queue.clone(), registry, QueueConfig::default());
//!
//! queue
//!     .enqueue(ActionType::CompleteDelivery, json!({"delivery_id": "dlv-1"}))
//!     .await;
//! let result = engine.sync().await;
//! assert_eq!(result.success.len(), 1);
//! assert_eq!(queue.pending_count().await, 0);
//! # }
//! ```

mod drain;
mod types;

pub use types::SyncResult;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::QueueConfig;
use crate::executor::ExecutorRegistry;
use crate::loss::{self, LossReport};
use crate::queue::QueueManager;
use crate::storage::traits::StoreError;

pub struct SyncEngine {
    pub(crate) queue: Arc<QueueManager>,
    pub(crate) registry: ExecutorRegistry,
    pub(crate) config: QueueConfig,
    /// Re-entrancy guard: only one drain loop at a time. Not a lock - a
    /// second `sync()` call is ignored, never queued.
    pub(crate) draining: AtomicBool,
}

impl SyncEngine {
    #[must_use]
    pub fn new(queue: Arc<QueueManager>, registry: ExecutorRegistry, config: QueueConfig) -> Self {
        Self {
            queue,
            registry,
            config,
            draining: AtomicBool::new(false),
        }
    }

    /// The queue this engine drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Probe the store for entries that vanished without going through the
    /// queue API. Folds in loss evidence captured when the queue was opened
    /// (checkpoint left by a previous run).
    pub async fn detect_loss(&self) -> Result<LossReport, StoreError> {
        let mut report = loss::detect_loss(self.queue.store().as_ref()).await?;
        if let Some(startup) = self.queue.take_startup_loss() {
            report.merge(startup);
        }
        Ok(report)
    }

    /// Rebase the loss checkpoint on current store contents, so an already
    /// surfaced loss is not reported again on the next probe. Called after
    /// the alert has been handed to the user.
    pub async fn reset_loss_baseline(&self) {
        self.queue.rewrite_checkpoint().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::events::EventBus;
    use crate::executor::ExecutionOutcome;
    use crate::storage::memory::MemoryStore;
    use crate::storage::traits::ActionStore;
    use serde_json::json;

    async fn engine_with(registry: ExecutorRegistry) -> (SyncEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await,
        );
        (
            SyncEngine::new(queue, registry, QueueConfig::default()),
            store,
        )
    }

    #[tokio::test]
    async fn test_detect_loss_empty_store() {
        let (engine, _) = engine_with(ExecutorRegistry::new()).await;
        let report = engine.detect_loss().await.unwrap();
        assert!(!report.data_lost);
    }

    #[tokio::test]
    async fn test_detect_loss_after_out_of_band_removal() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn(ActionType::LoadElement, |_| async { ExecutionOutcome::Ok });
        let (engine, store) = engine_with(registry).await;

        let id = engine
            .queue()
            .enqueue(ActionType::LoadElement, json!({}))
            .await;

        // Eviction: bypasses the queue API, checkpoint not rewritten.
        store.remove(&id).await.unwrap();

        let report = engine.detect_loss().await.unwrap();
        assert!(report.data_lost);
        assert_eq!(report.lost_count, 1);
        assert_eq!(report.lost_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_reset_loss_baseline_clears_report() {
        let (engine, store) = engine_with(ExecutorRegistry::new()).await;
        let id = engine
            .queue()
            .enqueue(ActionType::LoadElement, json!({}))
            .await;
        store.remove(&id).await.unwrap();

        assert!(engine.detect_loss().await.unwrap().data_lost);

        engine.reset_loss_baseline().await;
        assert!(!engine.detect_loss().await.unwrap().data_lost);
    }
}
