// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Two distinct uses in this crate:
//! - [`retry`] wraps fallible async operations (store open, schema init)
//!   with bounded retry.
//! - [`RetryPolicy::delay_for`] computes the pause between *automatic*
//!   re-drains while the queue still holds failed actions. Manual `sync()`
//!   calls are never gated by this schedule.
//!
//! # Example
//!
//! ```
//! use offline_queue::RetryPolicy;
//! use std::time::Duration;
//!
//! // Startup: fail fast on bad config
//! let startup = RetryPolicy::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! // Auto-drain schedule: 5s, 10s, 20s ... capped at 5 minutes
//! let drain = RetryPolicy::auto_drain();
//! assert_eq!(drain.delay_for(0), Duration::from_secs(5));
//! assert_eq!(drain.delay_for(1), Duration::from_secs(10));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry/backoff behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryPolicy::startup()`] - fast-fail for store initialization
/// - [`RetryPolicy::auto_drain()`] - schedule for automatic re-drains
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::auto_drain()
    }
}

impl RetryPolicy {
    /// Fast-fail retry for store initialization.
    /// Attempts 5 times with exponential backoff, failing after ~5 seconds.
    /// Use this at construction time to detect configuration errors quickly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Backoff schedule for automatic re-drains after failed syncs.
    /// Unbounded (the connectivity monitor keeps retrying while the app
    /// runs), delays capped at 5 minutes.
    #[must_use]
    pub fn auto_drain() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            factor: 2.0,
        }
    }

    /// Build a policy from the configured auto-retry knobs.
    #[must_use]
    pub fn from_millis(initial_ms: u64, max_ms: u64, factor: f64) -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            factor,
        }
    }

    /// Delay before retry number `attempt` (0-based), exponentially grown
    /// and capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 0..attempt {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
            if delay >= self.max_delay {
                break;
            }
        }
        delay.min(self.max_delay)
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = policy.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempts
                    );
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if let Some(max) = policy.max_retries {
                    if attempts >= max {
                        return Err(err);
                    }
                }

                warn!(
                    "Operation '{}' failed (attempt {}): {}. Retrying in {:?}...",
                    operation_name, attempts, err, delay
                );

                sleep(delay).await;
                delay = (delay.mul_f64(policy.factor)).min(policy.max_delay);
            }
        }
    }
}
