//! Configuration for the offline queue.
//!
//! # Example
//!
//! ```
//! use offline_queue::QueueConfig;
//!
//! // Minimal config (uses defaults)
//! let config = QueueConfig::default();
//! assert_eq!(config.executor_timeout_ms, 30_000);
//!
//! // Full config
//! let config = QueueConfig {
//!     store_path: Some("./driver_queue.db".into()),
//!     max_attempts: Some(5),
//!     loss_probe_interval_secs: 60,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the offline queue.
///
/// All fields have sensible defaults. For production use, configure
/// `store_path` so queued actions survive app restarts.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// SQLite file for the durable store. `None` = memory-only queue
    /// (session-scoped, not a degradation).
    #[serde(default)]
    pub store_path: Option<String>,

    /// Retryable failures allowed before an action is parked as a conflict.
    /// `None` disables the ceiling (discouraged: a permanently-broken action
    /// would then be retried on every drain forever).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,

    /// Per-executor-call timeout in milliseconds. A timed-out call counts
    /// as retryable, not as a conflict, because the true outcome is unknown.
    #[serde(default = "default_executor_timeout_ms")]
    pub executor_timeout_ms: u64,

    /// Interval between storage-loss probes, in seconds.
    #[serde(default = "default_loss_probe_interval_secs")]
    pub loss_probe_interval_secs: u64,

    /// How long the success banner lingers before auto-hiding, in
    /// milliseconds.
    #[serde(default = "default_success_linger_ms")]
    pub success_linger_ms: u64,

    /// Drain automatically on the offline→online transition.
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// Backoff schedule for automatic re-drains while failures persist.
    /// Manual `sync()` calls are never gated by this schedule.
    #[serde(default = "default_auto_retry_initial_ms")]
    pub auto_retry_initial_ms: u64,
    #[serde(default = "default_auto_retry_max_ms")]
    pub auto_retry_max_ms: u64,
    #[serde(default = "default_auto_retry_factor")]
    pub auto_retry_factor: f64,
}

fn default_max_attempts() -> Option<u32> {
    Some(8)
}
fn default_executor_timeout_ms() -> u64 {
    30_000
}
fn default_loss_probe_interval_secs() -> u64 {
    30
}
fn default_success_linger_ms() -> u64 {
    3_000
}
fn default_auto_sync() -> bool {
    true
}
fn default_auto_retry_initial_ms() -> u64 {
    5_000
}
fn default_auto_retry_max_ms() -> u64 {
    300_000
}
fn default_auto_retry_factor() -> f64 {
    2.0
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            max_attempts: default_max_attempts(),
            executor_timeout_ms: default_executor_timeout_ms(),
            loss_probe_interval_secs: default_loss_probe_interval_secs(),
            success_linger_ms: default_success_linger_ms(),
            auto_sync: default_auto_sync(),
            auto_retry_initial_ms: default_auto_retry_initial_ms(),
            auto_retry_max_ms: default_auto_retry_max_ms(),
            auto_retry_factor: default_auto_retry_factor(),
        }
    }
}
