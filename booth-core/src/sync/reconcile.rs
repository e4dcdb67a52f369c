//! Mirror Reconciler
//!
//! Opt-in background pass that re-upserts the mirror row of every event
//! document and backfills missing `postgres_event_id` references. Repairs
//! rows left behind by tolerated mirror failures.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::DualWriteSynchronizer;
use crate::error::MirrorWrite;

/// Counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub scanned: usize,
    pub upserted: usize,
    pub backfilled: usize,
    pub failed: usize,
}

pub struct MirrorReconciler {
    sync: DualWriteSynchronizer,
    batch_size: usize,
    interval: Duration,
    shutdown: CancellationToken,
}

impl MirrorReconciler {
    pub fn new(
        sync: DualWriteSynchronizer,
        batch_size: usize,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sync,
            batch_size: batch_size.max(1),
            interval,
            shutdown,
        }
    }

    /// Main loop: one pass per interval until shutdown
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Mirror reconciler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Mirror reconciler received shutdown signal");
                    break;
                }
            }

            let stats = self.run_pass().await;
            if stats.failed > 0 {
                tracing::warn!(
                    scanned = stats.scanned,
                    upserted = stats.upserted,
                    backfilled = stats.backfilled,
                    failed = stats.failed,
                    "Reconcile pass finished with failures"
                );
            } else {
                tracing::info!(
                    scanned = stats.scanned,
                    upserted = stats.upserted,
                    backfilled = stats.backfilled,
                    "Reconcile pass finished"
                );
            }
        }

        tracing::info!("Mirror reconciler stopped");
    }

    /// Walk all event documents once
    pub async fn run_pass(&self) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut skip = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let page = self.sync.events.page_by_created(skip, self.batch_size).await;
            let page_len = page.len();

            for doc in page {
                stats.scanned += 1;
                let owner = match self.sync.resolver.resolve_owner_field(&doc.user_id).await {
                    Ok(owner) => owner,
                    Err(e) => {
                        tracing::warn!(event_id = %doc.id, error = %e, "Cannot resolve event owner");
                        stats.failed += 1;
                        continue;
                    }
                };

                let doc_id = doc.id.clone();
                match self.sync.sync_event_row(owner, doc).await {
                    (_, Ok(MirrorWrite::Upserted { backfilled, .. })) => {
                        stats.upserted += 1;
                        if backfilled {
                            stats.backfilled += 1;
                        }
                    }
                    (_, Ok(_)) => stats.upserted += 1,
                    (_, Err(e)) => {
                        tracing::debug!(event_id = %doc_id, error = %e, "Reconcile failed for event");
                        stats.failed += 1;
                    }
                }
            }

            if page_len < self.batch_size {
                break;
            }
            skip += page_len;
        }
        stats
    }
}
