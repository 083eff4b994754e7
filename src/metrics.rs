// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the offline queue.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `offline_queue_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `action_type`: wire name of the action
//! - `outcome`: ok, retryable, conflict

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an action entering the queue.
pub fn record_enqueued(action_type: &str) {
    counter!(
        "offline_queue_enqueued_total",
        "action_type" => action_type.to_string()
    )
    .increment(1);
}

/// Record the classified outcome of one executor invocation.
pub fn record_outcome(action_type: &str, outcome: &str) {
    counter!(
        "offline_queue_outcomes_total",
        "action_type" => action_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one executor invocation's latency.
pub fn record_executor_latency(action_type: &str, duration: Duration) {
    histogram!(
        "offline_queue_executor_seconds",
        "action_type" => action_type.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a full drain's duration.
pub fn record_drain_duration(duration: Duration) {
    histogram!("offline_queue_drain_seconds").record(duration.as_secs_f64());
}

/// Record a user dismissing a conflicted action.
pub fn record_dismissed() {
    counter!("offline_queue_conflicts_dismissed_total").increment(1);
}

/// Record a user explicitly retrying a conflicted action.
pub fn record_conflict_retried() {
    counter!("offline_queue_conflicts_retried_total").increment(1);
}

/// Record actions found missing by the loss detector.
pub fn record_loss(count: usize) {
    counter!("offline_queue_lost_actions_total").increment(count as u64);
}

/// Record a payload failing hash verification on load.
pub fn record_corruption() {
    counter!("offline_queue_corrupted_payloads_total").increment(1);
}

/// Record an automatically triggered drain (reconnect or backoff timer).
pub fn record_auto_sync(trigger: &str) {
    counter!(
        "offline_queue_auto_sync_total",
        "trigger" => trigger.to_string()
    )
    .increment(1);
}

/// Set the current number of active (pending/syncing/failed) actions.
pub fn set_queue_depth(count: usize) {
    gauge!("offline_queue_depth").set(count as f64);
}

/// Set whether the store is running memory-only after losing its durable
/// backend.
pub fn set_degraded(degraded: bool) {
    gauge!("offline_queue_store_degraded").set(if degraded { 1.0 } else { 0.0 });
}
