//! # Offline Queue
//!
//! A durable offline action queue and synchronization engine for field
//! clients (delivery drivers, site tablets) working under intermittent
//! connectivity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Feature Code                           │
//! │  • enqueue("complete_delivery", payload)                   │
//! │  • never waits on the network                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Queue Manager                           │
//! │  • persists actions as pending, emits change events        │
//! │  • pending count / listings, conflict dismiss & retry      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (FIFO drain on trigger)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Sync Engine                            │
//! │  • one drain at a time, strict enqueue order               │
//! │  • executor outcomes: ok / retryable / conflict            │
//! │  • at-least-once; executors must be idempotent             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Durable Store                            │
//! │  • SQLite (WAL) with memory-only degradation               │
//! │  • loss-detection checkpoint beside the action log         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`ConnectivityMonitor`] binds the pieces to the host: it drains on
//! reconnect, re-drains on a backoff schedule while failures persist, probes
//! for storage loss, and publishes a single-state health banner.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_queue::{
//!     ActionType, ConnectivityMonitor, DurableStore, EventBus, ExecutionOutcome,
//!     ExecutorRegistry, QueueConfig, QueueManager, SyncEngine,
//! };
//! use serde_json::json;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = QueueConfig {
//!         store_path: Some("./driver_queue.db".into()),
//!         ..Default::default()
//!     };
//!
//!     let store = Arc::new(DurableStore::open(config.store_path.as_deref()).await);
//!     let queue = Arc::new(QueueManager::open(store, EventBus::new()).await);
//!
//!     let mut registry = ExecutorRegistry::new();
//!     registry.register_fn(ActionType::CompleteDelivery, |payload| async move {
//!         // Call the backend here; report Ok / Retryable / Conflict.
//!         let _ = payload;
//!         ExecutionOutcome::Ok
//!     });
//!
//!     let engine = Arc::new(SyncEngine::new(queue.clone(), registry, config));
//!
//!     // The host feeds connectivity transitions into this channel.
//!     let (_online_tx, online_rx) = watch::channel(true);
//!     let monitor = ConnectivityMonitor::spawn(engine, online_rx);
//!
//!     // Feature code fires and forgets.
//!     queue
//!         .enqueue(
//!             ActionType::CompleteDelivery,
//!             json!({"delivery_id": "dlv-301", "signature_ref": "sig/301.png"}),
//!         )
//!         .await;
//!
//!     let result = monitor.sync_now().await;
//!     println!("synced: {:?}", result.success);
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **FIFO**: one drain executes actions strictly in enqueue order, so
//!   causally dependent actions apply in sequence
//! - **At-least-once**: actions are only removed on confirmed success;
//!   unknown outcomes (timeout, crash) are retried
//! - **No silent drops**: entries leave the store only via confirmed
//!   success or explicit user dismissal; out-of-band disappearance is
//!   flagged by the loss detector
//! - **Degraded over dead**: if durable storage is unavailable the queue
//!   runs memory-only and says so, instead of failing
//!
//! ## Modules
//!
//! - [`queue`]: the [`QueueManager`] ingress API
//! - [`engine`]: the [`SyncEngine`] drain loop
//! - [`storage`]: store trait and backends (memory, SQLite, durable facade)
//! - [`executor`]: executor contract and dispatch registry
//! - [`connectivity`]: monitor, banner state machine, loss alerts
//! - [`loss`]: checkpoint-based storage-loss detection
//! - [`resilience`]: retry/backoff policies
//! - [`events`]: queue change notifications

pub mod action;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod events;
pub mod executor;
pub mod loss;
pub mod metrics;
pub mod queue;
pub mod resilience;
pub mod storage;

pub use action::{ActionStatus, ActionType, QueuedAction};
pub use config::QueueConfig;
pub use connectivity::{BannerState, ConnectivityMonitor, LossAlert};
pub use engine::{SyncEngine, SyncResult};
pub use events::{EventBus, QueueEvent};
pub use executor::{ActionExecutor, ExecutionOutcome, ExecutorRegistry, FnExecutor};
pub use loss::LossReport;
pub use queue::QueueManager;
pub use resilience::retry::RetryPolicy;
pub use storage::durable::DurableStore;
pub use storage::memory::MemoryStore;
pub use storage::sqlite::SqliteStore;
pub use storage::traits::{ActionStore, Checkpoint, StoreError};
