// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitor and queue-health banner.
//!
//! The host feeds online/offline transitions into a `watch` channel (from
//! whatever signal the platform offers); the monitor reacts:
//! - offline→online with a non-empty queue triggers a drain automatically
//! - offline with pending work shows the offline banner
//! - a backoff timer re-drains while failures persist
//! - a periodic probe checks for storage loss
//!
//! The banner is the single source of truth for queue health: exactly one
//! state at a time, and the "will retry automatically" states (syncing,
//! offline-pending) are distinct from "needs your attention" (error).
//! Storage loss is *not* a banner state - it is a separate sticky alert
//! that only [`ConnectivityMonitor::acknowledge_loss`] clears, because lost
//! actions cannot be retried and the user must be told to redo the work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, SyncResult};
use crate::events::QueueEvent;
use crate::loss::LossReport;
use crate::resilience::retry::RetryPolicy;

/// Queue-health banner state.
///
/// ```text
/// Hidden → Syncing → { Success (auto-hides) | Error } → Hidden
/// Hidden → OfflinePending   (connectivity drops with a non-empty queue)
/// any    → Syncing          (a drain starts)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerState {
    /// Online, nothing pending, no recent result: show nothing.
    Hidden,
    /// A drain is in progress.
    Syncing,
    /// The last drain completed cleanly; auto-hides after a short linger.
    Success,
    /// The last drain left failures or conflicts; offer a manual retry.
    Error,
    /// Offline with queued work; retry is pointless until reconnect.
    OfflinePending,
}

impl BannerState {
    /// Whether the banner should be rendered at all.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Hidden)
    }

    /// Whether this state asks for a user decision (as opposed to states
    /// that resolve on their own).
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Hidden => "Up to date",
            Self::Syncing => "Syncing queued actions...",
            Self::Success => "All actions synced",
            Self::Error => "Some actions need attention",
            Self::OfflinePending => "Offline - actions will sync on reconnect",
        }
    }
}

impl std::fmt::Display for BannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sticky storage-loss alert. Unlike a conflict there is nothing to retry:
/// the queued payloads are gone and the work must be redone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossAlert {
    pub lost_count: usize,
    pub lost_ids: Vec<String>,
}

impl From<LossReport> for LossAlert {
    fn from(report: LossReport) -> Self {
        Self {
            lost_count: report.lost_count,
            lost_ids: report.lost_ids,
        }
    }
}

impl LossAlert {
    fn absorb(&mut self, report: LossReport) {
        for id in report.lost_ids {
            if !self.lost_ids.contains(&id) {
                self.lost_ids.push(id);
            }
        }
        self.lost_count = self.lost_ids.len();
    }
}

pub struct ConnectivityMonitor {
    engine: Arc<SyncEngine>,
    banner_tx: watch::Sender<BannerState>,
    loss_tx: watch::Sender<Option<LossAlert>>,
    online_rx: watch::Receiver<bool>,
    linger: Duration,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Spawn the monitor over an engine and a host-fed connectivity signal.
    #[must_use]
    pub fn spawn(engine: Arc<SyncEngine>, online_rx: watch::Receiver<bool>) -> Self {
        let (banner_tx, _) = watch::channel(BannerState::Hidden);
        let (loss_tx, _) = watch::channel(None);
        let linger = Duration::from_millis(engine.config.success_linger_ms);

        let task = tokio::spawn(Self::run(
            engine.clone(),
            banner_tx.clone(),
            loss_tx.clone(),
            online_rx.clone(),
        ));

        Self {
            engine,
            banner_tx,
            loss_tx,
            online_rx,
            linger,
            task,
        }
    }

    /// Subscribe to banner state changes.
    #[must_use]
    pub fn banner(&self) -> watch::Receiver<BannerState> {
        self.banner_tx.subscribe()
    }

    /// Subscribe to the sticky loss alert (`None` = no unacknowledged loss).
    #[must_use]
    pub fn loss_alerts(&self) -> watch::Receiver<Option<LossAlert>> {
        self.loss_tx.subscribe()
    }

    /// Current connectivity as last reported by the host.
    #[must_use]
    pub fn online(&self) -> bool {
        *self.online_rx.borrow()
    }

    /// Manual "retry now": drain immediately, driving the banner through
    /// the syncing → result transition. Never gated by the backoff
    /// schedule.
    pub async fn sync_now(&self) -> SyncResult {
        run_drain(&self.engine, &self.banner_tx, self.linger).await
    }

    /// Acknowledge the current loss alert. The checkpoint has already been
    /// rebased when the alert was raised, so this only clears the surface.
    pub fn acknowledge_loss(&self) {
        info!("Storage-loss alert acknowledged by user");
        self.loss_tx.send_replace(None);
    }

    /// The single event loop: connectivity transitions, queue events, the
    /// loss probe, and the auto-retry backoff timer.
    async fn run(
        engine: Arc<SyncEngine>,
        banner_tx: watch::Sender<BannerState>,
        loss_tx: watch::Sender<Option<LossAlert>>,
        mut online_rx: watch::Receiver<bool>,
    ) {
        let config = &engine.config;
        let linger = Duration::from_millis(config.success_linger_ms);
        let retry_policy = RetryPolicy::from_millis(
            config.auto_retry_initial_ms,
            config.auto_retry_max_ms,
            config.auto_retry_factor,
        );
        let auto_sync = config.auto_sync;

        let mut probe = tokio::time::interval(Duration::from_secs(
            config.loss_probe_interval_secs.max(1),
        ));
        let mut events = engine.queue().events().subscribe();
        let mut was_online = *online_rx.borrow();
        let mut consecutive_failures: u32 = 0;

        let retry_sleep = tokio::time::sleep(retry_policy.delay_for(0));
        tokio::pin!(retry_sleep);

        loop {
            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity sender dropped, monitor stopping");
                        break;
                    }
                    let online = *online_rx.borrow();
                    if online && !was_online {
                        info!("Back online");
                        if auto_sync && engine.queue().pending_count().await > 0 {
                            crate::metrics::record_auto_sync("reconnect");
                            let result = run_drain(&engine, &banner_tx, linger).await;
                            consecutive_failures =
                                if result.is_clean() { 0 } else { consecutive_failures + 1 };
                        }
                    } else if !online && engine.queue().pending_count().await > 0 {
                        banner_tx.send_replace(BannerState::OfflinePending);
                    }
                    was_online = online;
                    retry_sleep.as_mut().reset(
                        Instant::now() + retry_policy.delay_for(consecutive_failures),
                    );
                }

                event = events.recv() => {
                    match event {
                        // One code path regardless of connectivity: enqueue
                        // always just writes the store; the monitor decides
                        // whether to execute now or show the offline banner.
                        Ok(QueueEvent::Enqueued { .. }) => {
                            if !*online_rx.borrow() {
                                banner_tx.send_replace(BannerState::OfflinePending);
                            } else if auto_sync {
                                crate::metrics::record_auto_sync("enqueue");
                                let result = run_drain(&engine, &banner_tx, linger).await;
                                consecutive_failures =
                                    if result.is_clean() { 0 } else { consecutive_failures + 1 };
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "Monitor lagged behind queue events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = probe.tick() => {
                    match engine.detect_loss().await {
                        Ok(report) if report.data_lost => {
                            warn!(
                                lost = report.lost_count,
                                "Queued actions vanished from storage"
                            );
                            crate::metrics::record_loss(report.lost_count);
                            loss_tx.send_modify(|alert| match alert {
                                Some(existing) => existing.absorb(report.clone()),
                                None => *alert = Some(LossAlert::from(report.clone())),
                            });
                            // Rebase so the same loss is not counted again
                            // by the next probe; the alert itself stays up
                            // until acknowledged.
                            engine.reset_loss_baseline().await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Loss probe failed"),
                    }
                }

                _ = &mut retry_sleep => {
                    let delay = if *online_rx.borrow()
                        && auto_sync
                        && engine.queue().pending_count().await > 0
                    {
                        crate::metrics::record_auto_sync("backoff");
                        let result = run_drain(&engine, &banner_tx, linger).await;
                        consecutive_failures =
                            if result.is_clean() { 0 } else { consecutive_failures + 1 };
                        retry_policy.delay_for(consecutive_failures)
                    } else {
                        consecutive_failures = 0;
                        retry_policy.delay_for(0)
                    };
                    retry_sleep.as_mut().reset(Instant::now() + delay);
                }
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drive one drain through the banner state machine.
async fn run_drain(
    engine: &Arc<SyncEngine>,
    banner_tx: &watch::Sender<BannerState>,
    linger: Duration,
) -> SyncResult {
    banner_tx.send_replace(BannerState::Syncing);
    let result = engine.sync().await;

    if !result.is_clean() {
        banner_tx.send_replace(BannerState::Error);
    } else if !result.success.is_empty() {
        banner_tx.send_replace(BannerState::Success);
        // Auto-hide unless something else (another drain, going offline)
        // has replaced the banner in the meantime.
        let banner_tx = banner_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            banner_tx.send_if_modified(|state| {
                if *state == BannerState::Success {
                    *state = BannerState::Hidden;
                    true
                } else {
                    false
                }
            });
        });
    } else {
        banner_tx.send_replace(BannerState::Hidden);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_visibility() {
        assert!(!BannerState::Hidden.is_visible());
        assert!(BannerState::Syncing.is_visible());
        assert!(BannerState::Success.is_visible());
        assert!(BannerState::Error.is_visible());
        assert!(BannerState::OfflinePending.is_visible());
    }

    #[test]
    fn test_only_error_needs_attention() {
        assert!(BannerState::Error.needs_attention());
        assert!(!BannerState::Syncing.needs_attention());
        assert!(!BannerState::OfflinePending.needs_attention());
        assert!(!BannerState::Success.needs_attention());
    }

    #[test]
    fn test_loss_alert_absorb_deduplicates() {
        let mut alert = LossAlert {
            lost_count: 1,
            lost_ids: vec!["a".to_string()],
        };
        alert.absorb(LossReport {
            data_lost: true,
            lost_count: 2,
            lost_ids: vec!["a".to_string(), "b".to_string()],
        });
        assert_eq!(alert.lost_count, 2);
        assert_eq!(alert.lost_ids, vec!["a", "b"]);
    }
}
