// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic offline-queue usage example.
//!
//! Demonstrates:
//! 1. Wiring up the store, queue, engine and connectivity monitor
//! 2. Enqueueing field actions while "offline"
//! 3. Automatic drain on reconnect
//! 4. Retryable failures and a semantic conflict
//! 5. Displaying metrics (OTEL-compatible)
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tokio::sync::watch;

use offline_queue::{
    ActionType, BannerState, ConnectivityMonitor, DurableStore, EventBus, ExecutionOutcome,
    ExecutorRegistry, QueueConfig, QueueManager, SyncEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           offline-queue: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire up the queue
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring offline queue...");

    let config = QueueConfig {
        // Durable file in the temp dir for the demo
        store_path: Some(
            std::env::temp_dir()
                .join("offline_queue_demo.db")
                .to_string_lossy()
                .to_string(),
        ),
        // Quick linger so the demo doesn't wait long
        success_linger_ms: 500,
        ..Default::default()
    };

    let store = Arc::new(DurableStore::open(config.store_path.as_deref()).await);
    println!("   Durable: {}", if store.degraded() { "no (memory-only)" } else { "yes" });

    let queue = Arc::new(QueueManager::open(store, EventBus::new()).await);

    // Executors: the seam to the real backend. Here, mocks - the delivery
    // completion fails once with a network error before succeeding, the
    // verification conflicts outright.
    let delivery_calls = Arc::new(AtomicUsize::new(0));
    let mut registry = ExecutorRegistry::new();
    {
        let delivery_calls = delivery_calls.clone();
        registry.register_fn(ActionType::CompleteDelivery, move |payload| {
            let delivery_calls = delivery_calls.clone();
            async move {
                if delivery_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ExecutionOutcome::Retryable("network unreachable".to_string())
                } else {
                    println!("   └─ Backend applied: complete_delivery {}", payload["delivery_id"]);
                    ExecutionOutcome::Ok
                }
            }
        });
    }
    registry.register_fn(ActionType::SaveVisualVerification, |payload| async move {
        ExecutionOutcome::Conflict(format!(
            "element {} already verified by another driver",
            payload["element_id"]
        ))
    });

    let engine = Arc::new(SyncEngine::new(queue.clone(), registry, config));

    // Host-fed connectivity signal; start offline, as at a field site.
    let (online_tx, online_rx) = watch::channel(false);
    let monitor = ConnectivityMonitor::spawn(engine, online_rx);
    let banner = monitor.banner();

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Queue work while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📴 Offline: queueing field actions...");

    queue
        .enqueue(
            ActionType::CompleteDelivery,
            json!({"delivery_id": "dlv-301", "signature_ref": "sig/301.png"}),
        )
        .await;
    queue
        .enqueue(
            ActionType::SaveVisualVerification,
            json!({"element_id": "el-17", "status": "approved"}),
        )
        .await;

    println!("   Pending: {}", queue.pending_count().await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    println!("   Banner:  {}", banner.borrow().description());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reconnect: the monitor drains automatically
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Back online - auto-sync kicks in...");
    online_tx.send(true)?;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    println!("   Pending after first drain: {}", queue.pending_count().await);
    println!("   Conflicts awaiting review: {}", queue.conflicted_actions().await.len());

    // The delivery failed once (retryable); retry it manually right away.
    println!("\n🔁 Manual retry for the flaky delivery...");
    let result = monitor.sync_now().await;
    println!("   Synced: {:?}", result.success.len());
    assert_eq!(*banner.borrow(), BannerState::Success);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Handle the conflict
    // ─────────────────────────────────────────────────────────────────────────
    for conflict in queue.conflicted_actions().await {
        println!(
            "\n⚠️  Conflict on {}: {}",
            conflict.action_type,
            conflict.last_error.as_deref().unwrap_or("unknown")
        );
        queue.dismiss_conflict(&conflict.id).await;
        println!("   └─ Dismissed after review");
    }

    println!("\n📊 Final state: pending={}", queue.pending_count().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics snapshot
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics captured:");
    let snapshot = snapshotter.snapshot();
    for (key, _, _, value) in snapshot.into_vec() {
        println!("   {} = {:?}", key.key().name(), value);
    }

    println!("\n✅ Done");
    Ok(())
}
