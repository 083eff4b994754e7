//! The drain loop: FIFO execution of queued actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{SyncEngine, SyncResult};
use crate::action::{ActionStatus, QueuedAction};
use crate::executor::ExecutionOutcome;

/// Clears the re-entrancy flag when the drain exits, on every path.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    /// Drain all active actions in FIFO order.
    ///
    /// Safe to call when offline: executor calls simply fail as retryable.
    /// Safe to call concurrently: while a drain is in flight, further calls
    /// return an empty [`SyncResult`] without invoking any executor. Never
    /// returns an error - per-action outcomes are the three partitions of
    /// the result.
    ///
    /// Ordering matters: queued actions can be causally dependent ("load
    /// element onto truck" must apply before "mark delivery complete" when
    /// both were queued offline for the same delivery), so the snapshot is
    /// processed strictly in enqueue order. Actions enqueued mid-drain wait
    /// for the next drain.
    #[tracing::instrument(skip(self), fields(total))]
    pub async fn sync(&self) -> SyncResult {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in flight, ignoring re-entrant sync call");
            return SyncResult::default();
        }
        let _guard = DrainGuard(&self.draining);

        let start = Instant::now();
        let snapshot = self.queue.active_snapshot().await;
        tracing::Span::current().record("total", snapshot.len());

        let mut result = SyncResult::default();
        if snapshot.is_empty() {
            return result;
        }

        info!(total = snapshot.len(), "Draining queued actions");

        for action in snapshot {
            // The user may have dismissed or retried this entry since the
            // snapshot was taken; re-read and skip anything no longer active.
            let current = match self.queue.store().get(&action.id).await {
                Ok(Some(current)) if current.status.is_active() => current,
                Ok(_) => {
                    debug!(id = %action.id, "Skipping action changed since snapshot");
                    continue;
                }
                Err(e) => {
                    warn!(id = %action.id, error = %e, "Skipping unreadable action");
                    result.failed.push(action.id.clone());
                    continue;
                }
            };

            self.queue.mark_syncing(&current).await;

            let exec_start = Instant::now();
            let outcome = self.execute_one(&current).await;
            crate::metrics::record_executor_latency(
                current.action_type.as_str(),
                exec_start.elapsed(),
            );
            crate::metrics::record_outcome(current.action_type.as_str(), outcome.as_str());

            match outcome {
                ExecutionOutcome::Ok => {
                    debug!(id = %current.id, "Action synced");
                    self.queue.complete(&current.id).await;
                    result.success.push(current.id);
                }
                ExecutionOutcome::Retryable(message) => {
                    let status = self
                        .queue
                        .record_retryable(&current, message, self.config.max_attempts)
                        .await;
                    if status == ActionStatus::Conflict {
                        result.conflicts.push(current.id);
                    } else {
                        result.failed.push(current.id);
                    }
                }
                ExecutionOutcome::Conflict(message) => {
                    warn!(id = %current.id, %message, "Action conflicted");
                    self.queue.record_conflict(&current, message).await;
                    result.conflicts.push(current.id);
                }
            }
        }

        crate::metrics::record_drain_duration(start.elapsed());
        info!(%result, "Drain complete");
        result
    }

    /// Run one executor invocation under the configured timeout.
    ///
    /// The executor runs in its own task so a panic is contained and
    /// classified rather than tearing down the drain. Timeouts and panics
    /// are both retryable: in either case the true server-side outcome is
    /// unknown, and idempotent executors make re-execution safe.
    async fn execute_one(&self, action: &QueuedAction) -> ExecutionOutcome {
        let Some(executor) = self.registry.get(&action.action_type) else {
            return ExecutionOutcome::Retryable(format!(
                "no executor registered for '{}'",
                action.action_type
            ));
        };

        let payload = action.payload.clone();
        let handle = tokio::spawn(async move { executor.execute(payload).await });
        let abort = handle.abort_handle();

        let timeout = Duration::from_millis(self.config.executor_timeout_ms);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                warn!(id = %action.id, error = %join_err, "Executor crashed");
                ExecutionOutcome::Retryable(format!("executor crashed: {}", join_err))
            }
            Err(_) => {
                abort.abort();
                warn!(id = %action.id, timeout_ms = self.config.executor_timeout_ms, "Executor timed out");
                ExecutionOutcome::Retryable(format!(
                    "executor timed out after {}ms",
                    self.config.executor_timeout_ms
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::config::QueueConfig;
    use crate::events::EventBus;
    use crate::executor::ExecutorRegistry;
    use crate::queue::QueueManager;
    use crate::storage::memory::MemoryStore;
    use crate::storage::traits::ActionStore;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn engine_with(
        registry: ExecutorRegistry,
        config: QueueConfig,
    ) -> (Arc<SyncEngine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await,
        );
        (
            Arc::new(SyncEngine::new(queue, registry, config)),
            store,
        )
    }

    #[tokio::test]
    async fn test_empty_queue_drains_to_empty_result() {
        let (engine, _) = engine_with(ExecutorRegistry::new(), QueueConfig::default()).await;
        let result = engine.sync().await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_action_type_is_retryable() {
        let (engine, store) =
            engine_with(ExecutorRegistry::new(), QueueConfig::default()).await;
        let id = engine
            .queue()
            .enqueue(ActionType::ReportIssue, json!({}))
            .await;

        let result = engine.sync().await;

        assert_eq!(result.failed, vec![id.clone()]);
        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.attempts, 1);
        assert!(action
            .last_error
            .as_deref()
            .unwrap()
            .contains("no executor registered"));
    }

    #[tokio::test]
    async fn test_retry_ceiling_parks_as_conflict() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn(ActionType::LoadElement, |_| async {
            ExecutionOutcome::Retryable("network unreachable".to_string())
        });
        let config = QueueConfig {
            max_attempts: Some(2),
            ..Default::default()
        };
        let (engine, store) = engine_with(registry, config).await;
        let id = engine
            .queue()
            .enqueue(ActionType::LoadElement, json!({}))
            .await;

        // First drain: attempts 1, still pending.
        let result = engine.sync().await;
        assert_eq!(result.failed, vec![id.clone()]);

        // Second drain: ceiling reached, parked as conflict.
        let result = engine.sync().await;
        assert_eq!(result.conflicts, vec![id.clone()]);

        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Conflict);
        assert_eq!(action.attempts, 2);
        assert!(action
            .last_error
            .as_deref()
            .unwrap()
            .contains("retry limit reached"));

        // Third drain: conflict excluded, nothing touched.
        let result = engine.sync().await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_executor_timeout_is_retryable() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn(ActionType::CompleteDelivery, |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ExecutionOutcome::Ok
        });
        let config = QueueConfig {
            executor_timeout_ms: 20,
            ..Default::default()
        };
        let (engine, store) = engine_with(registry, config).await;
        let id = engine
            .queue()
            .enqueue(ActionType::CompleteDelivery, json!({}))
            .await;

        let result = engine.sync().await;

        assert_eq!(result.failed, vec![id.clone()]);
        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_executor_panic_is_retryable() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn(ActionType::CompleteDelivery, |_| async {
            panic!("executor bug");
        });
        let (engine, store) = engine_with(registry, QueueConfig::default()).await;
        let id = engine
            .queue()
            .enqueue(ActionType::CompleteDelivery, json!({}))
            .await;

        let result = engine.sync().await;

        assert_eq!(result.failed, vec![id.clone()]);
        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.last_error.as_deref().unwrap().contains("crashed"));
    }

    #[tokio::test]
    async fn test_removed_mid_drain_is_skipped() {
        // Action A's executor removes action B behind the drain's back (as a
        // user dismissal during a long drain would); B must not execute.
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await,
        );

        let b_id = Arc::new(parking_lot::Mutex::new(String::new()));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = ExecutorRegistry::new();
        {
            let store = store.clone();
            let b_id = b_id.clone();
            registry.register_fn(ActionType::LoadElement, move |_| {
                let store = store.clone();
                let b_id = b_id.clone();
                async move {
                    let id = b_id.lock().clone();
                    store.remove(&id).await.unwrap();
                    ExecutionOutcome::Ok
                }
            });
        }
        {
            let b_calls = b_calls.clone();
            registry.register_fn(ActionType::CompleteDelivery, move |_| {
                let b_calls = b_calls.clone();
                async move {
                    b_calls.fetch_add(1, Ordering::SeqCst);
                    ExecutionOutcome::Ok
                }
            });
        }

        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            registry,
            QueueConfig::default(),
        ));

        let a = queue.enqueue(ActionType::LoadElement, json!({})).await;
        let b = queue.enqueue(ActionType::CompleteDelivery, json!({})).await;
        *b_id.lock() = b.clone();

        let result = engine.sync().await;

        assert_eq!(result.success, vec![a]);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert!(store.get(&b).await.unwrap().is_none());
    }
}
