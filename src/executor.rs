//! Executor contract and dispatch registry.
//!
//! Executors are the seam between the queue and the rest of the application:
//! the queue is agnostic to what they do (REST call, RPC, storage upload).
//! The one contract the sync engine depends on is **idempotency** - drains
//! are at-least-once, so an executor must tolerate seeing the same action id
//! twice (e.g. "complete delivery" is a no-op if that delivery was already
//! completed by the same actor).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::ActionType;

/// Outcome of one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The mutation was applied (or was already applied - idempotent no-op).
    Ok,
    /// Transient failure (network unreachable, timeout, 5xx). The action
    /// stays in the queue and is retried on the next drain.
    Retryable(String),
    /// Semantic rejection (already finalized, superseded, target deleted).
    /// The action is parked as a conflict and never auto-retried.
    Conflict(String),
}

impl ExecutionOutcome {
    /// Metrics/log label for this outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Retryable(_) => "retryable",
            Self::Conflict(_) => "conflict",
        }
    }
}

/// An async function that performs the real backend mutation for one
/// action type.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, payload: Value) -> ExecutionOutcome;
}

/// Adapter turning an async closure into an [`ActionExecutor`].
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ActionExecutor for FnExecutor<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = ExecutionOutcome> + Send,
{
    async fn execute(&self, payload: Value) -> ExecutionOutcome {
        (self.0)(payload).await
    }
}

/// Dispatch table from [`ActionType`] to executor.
///
/// A typed map rather than string dispatch: every registered handler is
/// checked against the same enum the queue stores, so a drain can only miss
/// a handler for types the host genuinely never registered (reported as a
/// retryable failure, since the registry may be completed later).
#[derive(Default)]
pub struct ExecutorRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an executor for an action type, replacing any previous one.
    pub fn register(&mut self, action_type: ActionType, executor: Arc<dyn ActionExecutor>) {
        self.handlers.insert(action_type, executor);
    }

    /// Register an async closure for an action type.
    pub fn register_fn<F, Fut>(&mut self, action_type: ActionType, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExecutionOutcome> + Send + 'static,
    {
        self.register(action_type, Arc::new(FnExecutor(f)));
    }

    /// Look up the executor for an action type.
    #[must_use]
    pub fn get(&self, action_type: &ActionType) -> Option<Arc<dyn ActionExecutor>> {
        self.handlers.get(action_type).cloned()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn(ActionType::CompleteDelivery, |payload| async move {
            assert_eq!(payload["delivery_id"], "dlv-1");
            ExecutionOutcome::Ok
        });

        let executor = registry.get(&ActionType::CompleteDelivery).unwrap();
        let outcome = executor.execute(json!({"delivery_id": "dlv-1"})).await;
        assert_eq!(outcome, ExecutionOutcome::Ok);
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let registry = ExecutorRegistry::new();
        assert!(registry.get(&ActionType::LoadElement).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_custom_type_dispatch() {
        let mut registry = ExecutorRegistry::new();
        let site_note = ActionType::Custom("site_note".to_string());
        registry.register_fn(site_note.clone(), |_| async {
            ExecutionOutcome::Conflict("note already filed".to_string())
        });

        assert_eq!(registry.len(), 1);
        let outcome = registry
            .get(&site_note)
            .unwrap()
            .execute(json!({}))
            .await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Conflict("note already filed".to_string())
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ExecutionOutcome::Ok.as_str(), "ok");
        assert_eq!(
            ExecutionOutcome::Retryable("x".to_string()).as_str(),
            "retryable"
        );
        assert_eq!(
            ExecutionOutcome::Conflict("x".to_string()).as_str(),
            "conflict"
        );
    }
}
