//! Retention manager for cleaning up old results.

use crate::db::{Repository, Store, StoreError};

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Periodically deletes results older than their metric's `deleteAfter`.
pub struct RetentionManager {
    store: Store,
    period: Duration,
    stop: Mutex<Option<broadcast::Sender<()>>>,
}

impl RetentionManager {
    pub fn new(store: Store, period: Duration) -> Self {
        Self {
            store,
            period,
            stop: Mutex::new(None),
        }
    }

    /// Start the retention background task. The first sweep runs immediately.
    pub async fn start(&self) -> JoinHandle<()> {
        let (tx, mut rx) = broadcast::channel(1);
        *self.stop.lock().await = Some(tx);

        let store = self.store.clone();
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => process_retention(&store),
                }
            }
        })
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

fn process_retention(store: &Store) {
    match sweep_expired_results(store, Utc::now()) {
        Ok(0) => {}
        Ok(deleted) => tracing::info!("RetentionManager: Deleted {} expired results", deleted),
        Err(e) => tracing::error!("RetentionManager: Sweep failed: {}", e),
    }
}

/// For every stored metric, delete its results older than `now - deleteAfter`.
/// Metrics whose cutoff precedes the calendar range are skipped. Returns the
/// total number of rows removed.
pub fn sweep_expired_results<R: Repository + ?Sized>(repo: &R, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let mut deleted = 0;

    for component in repo.list_components()? {
        for metric in repo.list_metrics_by_component(&component.id)? {
            let Some(cutoff) = metric.delete_after.cutoff_before(now) else {
                continue;
            };
            deleted += repo.delete_metric_results_older_than(&component.id, &metric.id, cutoff)?;
        }
    }

    Ok(deleted)
}
