//! Queue manager: the ingress API used by feature code.
//!
//! Feature code (delivery completion, visual verification submission) calls
//! [`QueueManager::enqueue`] without knowing whether the network is up.
//! Enqueue-then-sync-asynchronously gives a single code path regardless of
//! connectivity: the same ordering and retry semantics apply whether the
//! user started offline or went offline mid-action.
//!
//! The manager is the only component that writes to the store. Every
//! mutation also rewrites the loss-detection checkpoint and emits a
//! [`QueueEvent`], so observers always see a consistent picture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::{ActionStatus, ActionType, QueuedAction};
use crate::events::{EventBus, QueueEvent};
use crate::loss::{self, LossReport};
use crate::storage::traits::{ActionStore, Checkpoint};

pub struct QueueManager {
    store: Arc<dyn ActionStore>,
    events: EventBus,
    seq: AtomicU64,
    /// Loss detected against the checkpoint left by the previous run,
    /// captured once at open and folded into the first probe.
    startup_loss: Mutex<Option<LossReport>>,
}

impl QueueManager {
    /// Open the manager over a store, recovering state from a previous run:
    /// actions stuck in `syncing` (the app died mid-drain) are reset to
    /// `pending` so the next drain retries them - executors are idempotent,
    /// so re-execution is safe.
    pub async fn open(store: Arc<dyn ActionStore>, events: EventBus) -> Self {
        // Capture loss evidence before any mutation can rewrite the
        // checkpoint.
        let startup_loss = match loss::detect_loss(store.as_ref()).await {
            Ok(report) if report.data_lost => {
                warn!(
                    lost = report.lost_count,
                    "Queued actions missing since previous run (storage loss?)"
                );
                Some(report)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Startup loss probe failed");
                None
            }
        };

        let existing = match store.get_all().await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "Could not read store at open, starting empty");
                Vec::new()
            }
        };

        let next_seq = existing.iter().map(|a| a.seq + 1).max().unwrap_or(0);

        let stuck: Vec<&QueuedAction> = existing
            .iter()
            .filter(|a| a.status == ActionStatus::Syncing)
            .collect();
        if !stuck.is_empty() {
            warn!(
                count = stuck.len(),
                "Actions left in syncing state by previous run, resetting to pending"
            );
            for action in stuck {
                let mut reset = action.clone();
                reset.status = ActionStatus::Pending;
                if let Err(e) = store.put(&reset).await {
                    warn!(id = %reset.id, error = %e, "Failed to reset stuck action");
                }
            }
        }

        crate::metrics::set_queue_depth(
            existing.iter().filter(|a| a.status.is_active()).count(),
        );

        Self {
            store,
            events,
            seq: AtomicU64::new(next_seq),
            startup_loss: Mutex::new(startup_loss),
        }
    }

    /// Record a new action. No network I/O happens here: the action is
    /// persisted as `pending` and picked up by the next drain. Always
    /// returns the new action's id - store failures are logged, never
    /// propagated to the calling feature code (the durable store facade
    /// degrades instead of erroring).
    pub async fn enqueue(&self, action_type: ActionType, payload: Value) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let action = QueuedAction::new(action_type.clone(), payload, seq);
        let id = action.id.clone();

        if let Err(e) = self.store.put(&action).await {
            warn!(id = %id, error = %e, "Failed to persist enqueued action");
        }
        self.rewrite_checkpoint().await;

        crate::metrics::record_enqueued(action_type.as_str());
        crate::metrics::set_queue_depth(self.pending_count().await);
        debug!(id = %id, action_type = %action_type, "Action enqueued");

        self.events.emit(QueueEvent::Enqueued { id: id.clone(), action_type });
        id
    }

    /// Number of actions awaiting sync (`pending`, `syncing`, `failed`).
    /// Conflicted actions are excluded - they need the user, not the
    /// network.
    pub async fn pending_count(&self) -> usize {
        match self.store.count_active().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count pending actions");
                0
            }
        }
    }

    /// Actions awaiting sync, in FIFO order - for display ("3 actions
    /// awaiting sync: ...").
    pub async fn pending_actions(&self) -> Vec<QueuedAction> {
        self.all_where(|a| a.status.is_active()).await
    }

    /// Conflicted actions awaiting user review, in FIFO order.
    pub async fn conflicted_actions(&self) -> Vec<QueuedAction> {
        self.all_where(|a| a.status == ActionStatus::Conflict).await
    }

    async fn all_where(&self, keep: impl Fn(&QueuedAction) -> bool) -> Vec<QueuedAction> {
        match self.store.get_all().await {
            Ok(all) => all.into_iter().filter(keep).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list actions");
                Vec::new()
            }
        }
    }

    /// Discard a conflicted action after manual review. Returns `false`
    /// when the id is absent or not in conflict status (nothing removed).
    ///
    /// This is the one deliberate data-loss path in the queue.
    pub async fn dismiss_conflict(&self, id: &str) -> bool {
        let action = match self.store.get(id).await {
            Ok(Some(action)) => action,
            Ok(None) => return false,
            Err(e) => {
                warn!(id, error = %e, "Failed to load action for dismissal");
                return false;
            }
        };

        if action.status != ActionStatus::Conflict {
            warn!(id, status = %action.status, "Refusing to dismiss non-conflict action");
            return false;
        }

        if let Err(e) = self.store.remove(id).await {
            warn!(id, error = %e, "Failed to remove dismissed conflict");
            return false;
        }
        self.rewrite_checkpoint().await;

        crate::metrics::record_dismissed();
        info!(id, "Conflicted action dismissed by user");
        self.events.emit(QueueEvent::ConflictDismissed { id: id.to_string() });
        true
    }

    /// Put a conflicted action back into the automatic retry pool, with a
    /// fresh attempt budget. Explicitly user-initiated - conflicts are never
    /// silently reattempted.
    pub async fn retry_conflict(&self, id: &str) -> bool {
        let action = match self.store.get(id).await {
            Ok(Some(action)) if action.status == ActionStatus::Conflict => action,
            Ok(_) => return false,
            Err(e) => {
                warn!(id, error = %e, "Failed to load action for retry");
                return false;
            }
        };

        let mut retried = action;
        retried.status = ActionStatus::Pending;
        retried.attempts = 0;
        retried.last_error = None;

        if let Err(e) = self.store.put(&retried).await {
            warn!(id, error = %e, "Failed to requeue conflicted action");
            return false;
        }

        crate::metrics::record_conflict_retried();
        crate::metrics::set_queue_depth(self.pending_count().await);
        info!(id, "Conflicted action requeued by user");
        self.events.emit(QueueEvent::StatusChanged {
            id: id.to_string(),
            status: ActionStatus::Pending,
        });
        true
    }

    /// Event bus for queue observers.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The underlying store (loss probes read it directly).
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    // --- Drain-side mutations (crate-internal, used by the sync engine) ---

    /// FIFO snapshot of the active set for one drain.
    pub(crate) async fn active_snapshot(&self) -> Vec<QueuedAction> {
        self.pending_actions().await
    }

    pub(crate) async fn mark_syncing(&self, action: &QueuedAction) {
        let mut updated = action.clone();
        updated.status = ActionStatus::Syncing;
        if let Err(e) = self.store.put(&updated).await {
            warn!(id = %action.id, error = %e, "Failed to mark action syncing");
        }
        self.events.emit(QueueEvent::StatusChanged {
            id: action.id.clone(),
            status: ActionStatus::Syncing,
        });
    }

    /// Confirmed success: remove the action for good.
    pub(crate) async fn complete(&self, id: &str) {
        if let Err(e) = self.store.remove(id).await {
            warn!(id, error = %e, "Failed to remove synced action");
        }
        self.rewrite_checkpoint().await;
        crate::metrics::set_queue_depth(self.pending_count().await);
        self.events.emit(QueueEvent::Synced { id: id.to_string() });
    }

    /// Retryable failure: bump attempts and return the action to `pending`,
    /// or park it as a conflict once the attempt ceiling is reached.
    /// Returns the resulting status.
    pub(crate) async fn record_retryable(
        &self,
        action: &QueuedAction,
        message: String,
        max_attempts: Option<u32>,
    ) -> ActionStatus {
        let mut updated = action.clone();
        updated.attempts += 1;

        let exhausted = matches!(max_attempts, Some(max) if updated.attempts >= max);
        if exhausted {
            updated.status = ActionStatus::Conflict;
            updated.last_error = Some(format!(
                "retry limit reached after {} attempts: {}",
                updated.attempts, message
            ));
            warn!(
                id = %action.id,
                attempts = updated.attempts,
                "Action exhausted its retry budget, parking as conflict"
            );
        } else {
            updated.status = ActionStatus::Pending;
            updated.last_error = Some(message);
            debug!(
                id = %action.id,
                attempts = updated.attempts,
                "Retryable failure, action stays queued"
            );
        }

        let status = updated.status;
        if let Err(e) = self.store.put(&updated).await {
            warn!(id = %action.id, error = %e, "Failed to record retryable failure");
        }
        self.events.emit(QueueEvent::StatusChanged {
            id: action.id.clone(),
            status,
        });
        status
    }

    /// Semantic conflict: park the action for user review.
    pub(crate) async fn record_conflict(&self, action: &QueuedAction, message: String) {
        let mut updated = action.clone();
        updated.status = ActionStatus::Conflict;
        updated.last_error = Some(message);

        if let Err(e) = self.store.put(&updated).await {
            warn!(id = %action.id, error = %e, "Failed to record conflict");
        }
        crate::metrics::set_queue_depth(self.pending_count().await);
        self.events.emit(QueueEvent::StatusChanged {
            id: action.id.clone(),
            status: ActionStatus::Conflict,
        });
    }

    /// Rewrite the loss-detection checkpoint to match current store
    /// contents. Called after every mutation that adds or removes entries,
    /// and after a loss report has been surfaced (so the same loss is not
    /// re-reported forever).
    pub(crate) async fn rewrite_checkpoint(&self) {
        let expected = match self.store.get_all().await {
            Ok(all) => all.into_iter().map(|a| a.id).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read store for checkpoint");
                return;
            }
        };
        if let Err(e) = self.store.save_checkpoint(&Checkpoint::new(expected)).await {
            warn!(error = %e, "Failed to persist checkpoint");
        }
    }

    /// Loss detected at open against the previous run's checkpoint, if any.
    /// Consumed by the first periodic probe.
    pub(crate) fn take_startup_loss(&self) -> Option<LossReport> {
        self.startup_loss.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use serde_json::json;

    async fn manager_with_memory() -> (QueueManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager =
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await;
        (manager, store)
    }

    #[tokio::test]
    async fn test_enqueue_persists_pending_action() {
        let (manager, store) = manager_with_memory().await;

        let id = manager
            .enqueue(
                ActionType::CompleteDelivery,
                json!({"delivery_id": "dlv-1"}),
            )
            .await;

        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.attempts, 0);
        assert_eq!(manager.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_seq() {
        let (manager, store) = manager_with_memory().await;

        let a = manager.enqueue(ActionType::LoadElement, json!({})).await;
        let b = manager.enqueue(ActionType::LoadElement, json!({})).await;

        let seq_a = store.get(&a).await.unwrap().unwrap().seq;
        let seq_b = store.get(&b).await.unwrap().unwrap().seq;
        assert!(seq_a < seq_b);
    }

    #[tokio::test]
    async fn test_enqueue_emits_event() {
        let (manager, _) = manager_with_memory().await;
        let mut rx = manager.events().subscribe();

        let id = manager.enqueue(ActionType::ReportIssue, json!({})).await;

        match rx.recv().await.unwrap() {
            QueueEvent::Enqueued {
                id: event_id,
                action_type,
            } => {
                assert_eq!(event_id, id);
                assert_eq!(action_type, ActionType::ReportIssue);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_seq_resumes_after_reopen() {
        let store = Arc::new(MemoryStore::new());
        {
            let manager =
                QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await;
            manager.enqueue(ActionType::LoadElement, json!({})).await;
            manager.enqueue(ActionType::LoadElement, json!({})).await;
        }

        let manager =
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await;
        let id = manager.enqueue(ActionType::LoadElement, json!({})).await;

        let action = store.get(&id).await.unwrap().unwrap();
        assert_eq!(action.seq, 2);
    }

    #[tokio::test]
    async fn test_open_resets_stuck_syncing_actions() {
        let store = Arc::new(MemoryStore::new());
        let mut stuck = QueuedAction::new(ActionType::CompleteDelivery, json!({}), 0);
        stuck.status = ActionStatus::Syncing;
        store.put(&stuck).await.unwrap();

        let manager =
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await;

        let recovered = store.get(&stuck.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, ActionStatus::Pending);
        assert_eq!(manager.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_dismiss_requires_conflict_status() {
        let (manager, store) = manager_with_memory().await;
        let id = manager.enqueue(ActionType::LoadElement, json!({})).await;

        // Pending actions cannot be dismissed.
        assert!(!manager.dismiss_conflict(&id).await);
        assert!(store.get(&id).await.unwrap().is_some());

        // Conflicted ones can.
        let mut conflicted = store.get(&id).await.unwrap().unwrap();
        conflicted.status = ActionStatus::Conflict;
        store.put(&conflicted).await.unwrap();

        assert!(manager.dismiss_conflict(&id).await);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dismiss_missing_id_is_false() {
        let (manager, _) = manager_with_memory().await;
        assert!(!manager.dismiss_conflict("nonexistent").await);
    }

    #[tokio::test]
    async fn test_retry_conflict_resets_budget() {
        let (manager, store) = manager_with_memory().await;
        let id = manager.enqueue(ActionType::LoadElement, json!({})).await;

        let mut conflicted = store.get(&id).await.unwrap().unwrap();
        conflicted.status = ActionStatus::Conflict;
        conflicted.attempts = 8;
        conflicted.last_error = Some("already loaded".to_string());
        store.put(&conflicted).await.unwrap();
        assert_eq!(manager.pending_count().await, 0);

        assert!(manager.retry_conflict(&id).await);

        let retried = store.get(&id).await.unwrap().unwrap();
        assert_eq!(retried.status, ActionStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(retried.last_error.is_none());
        assert_eq!(manager.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_pending_and_conflicted_listings() {
        let (manager, store) = manager_with_memory().await;
        let a = manager.enqueue(ActionType::LoadElement, json!({})).await;
        let b = manager
            .enqueue(ActionType::CompleteDelivery, json!({}))
            .await;

        let mut conflicted = store.get(&b).await.unwrap().unwrap();
        conflicted.status = ActionStatus::Conflict;
        store.put(&conflicted).await.unwrap();

        let pending = manager.pending_actions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a);

        let conflicts = manager.conflicted_actions().await;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, b);
    }

    #[tokio::test]
    async fn test_startup_loss_captured_at_open() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_checkpoint(&Checkpoint::new(vec!["ghost-1".to_string()]))
            .await
            .unwrap();

        let manager =
            QueueManager::open(store.clone() as Arc<dyn ActionStore>, EventBus::new()).await;

        let report = manager.take_startup_loss().unwrap();
        assert!(report.data_lost);
        assert_eq!(report.lost_ids, vec!["ghost-1".to_string()]);
        // Consumed exactly once.
        assert!(manager.take_startup_loss().is_none());
    }
}
