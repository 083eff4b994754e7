//! Queue change notifications.
//!
//! An explicit publish/subscribe bus instead of ambient global events: the
//! bus is constructed once, handed to whichever components need it, and any
//! number of observers (banner, pending-count badge, diagnostics panel)
//! subscribe independently. Dropping a receiver unsubscribes it.

use tokio::sync::broadcast;

use crate::action::{ActionStatus, ActionType};

/// Emitted on every store mutation performed through the queue API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A new action was recorded.
    Enqueued { id: String, action_type: ActionType },
    /// An action's status changed during a drain or a user retry.
    StatusChanged { id: String, status: ActionStatus },
    /// An action completed and was removed from the store.
    Synced { id: String },
    /// The user discarded a conflicted action after review. Deliberate data
    /// loss - distinct from storage loss, which is never user-initiated.
    ConflictDismissed { id: String },
}

/// Broadcast bus for [`QueueEvent`]s.
///
/// Slow subscribers that fall behind the channel capacity miss events
/// (they receive a lag notice from the channel); the queue itself never
/// blocks on listeners.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Default channel capacity. Drains emit a few events per action, so
    /// this comfortably covers a large backlog sync.
    const CAPACITY: usize = 256;

    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Subscribe to queue events. Each receiver sees every event emitted
    /// after the call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers. A send with no subscribers
    /// is not an error.
    pub fn emit(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(QueueEvent::Synced {
            id: "a-1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            QueueEvent::Synced {
                id: "a-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(QueueEvent::ConflictDismissed {
            id: "a-1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(QueueEvent::Enqueued {
            id: "a-1".to_string(),
            action_type: ActionType::CompleteDelivery,
        });

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
