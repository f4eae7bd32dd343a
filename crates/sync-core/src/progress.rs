//! §4.I Progress Publisher: two trackers behind one mutex-guarded struct
//! (§9 open-question decision — kept as two trackers matching the two
//! channel schemas, but unified so call sites see one API), grounded on
//! the historical `SyncProgress`/`SyncEntityStateTracker` pair.

use std::collections::BTreeMap;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex};
use tracing::info;

use sync_api::error::JobStatus;
use sync_api::progress::{CountersSnapshot, StateSnapshot, SyncCompleteMessage};

use crate::settings::SyncSettings;

struct Inner {
    counters: CountersSnapshot,
    last_published_sum: u64,
    ops_since_status_log: u64,
    entity_type_totals: BTreeMap<String, i64>,
    entities_encountered: BTreeMap<String, std::collections::BTreeSet<String>>,
    last_state_publish: Instant,
    finalized: bool,
}

/// One per sync job. `Clone` is cheap (shared `Arc` internals via the
/// broadcast senders and a shared mutex), matching the single-owner-per-
/// run lifetime of the historical `SyncProgress` instance.
pub struct ProgressPublisher {
    inner: Mutex<Inner>,
    counters_tx: broadcast::Sender<CountersSnapshot>,
    state_tx: broadcast::Sender<StateSnapshot>,
    complete_tx: broadcast::Sender<SyncCompleteMessage>,
    publish_threshold: u64,
    status_log_interval: u64,
    state_publish_interval: std::time::Duration,
    sync_job_id: String,
}

impl ProgressPublisher {
    pub fn new(sync_job_id: impl Into<String>, settings: &SyncSettings) -> Self {
        let (counters_tx, _) = broadcast::channel(256);
        let (state_tx, _) = broadcast::channel(256);
        let (complete_tx, _) = broadcast::channel(4);
        Self {
            inner: Mutex::new(Inner {
                counters: CountersSnapshot::default(),
                last_published_sum: 0,
                ops_since_status_log: 0,
                entity_type_totals: BTreeMap::new(),
                entities_encountered: BTreeMap::new(),
                last_state_publish: Instant::now(),
                finalized: false,
            }),
            counters_tx,
            state_tx,
            complete_tx,
            publish_threshold: settings.publish_threshold,
            status_log_interval: settings.status_log_interval,
            state_publish_interval: settings.state_publish_interval,
            sync_job_id: sync_job_id.into(),
        }
    }

    pub fn subscribe_counters(&self) -> broadcast::Receiver<CountersSnapshot> {
        self.counters_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_complete(&self) -> broadcast::Receiver<SyncCompleteMessage> {
        self.complete_tx.subscribe()
    }

    /// Increment one named counter by `delta` (§4.I "Every processor
    /// action increments exactly one counter").
    pub async fn increment(&self, counter: &str, delta: u64) {
        let mut inner = self.inner.lock().await;
        match counter {
            "inserted" => inner.counters.inserted += delta,
            "updated" => inner.counters.updated += delta,
            "kept" => inner.counters.kept += delta,
            "deleted" => inner.counters.deleted += delta,
            "skipped" => inner.counters.skipped += delta,
            other => {
                tracing::warn!(counter = other, "unknown progress counter; ignoring");
                return;
            }
        }
        inner.ops_since_status_log += delta;

        if inner.ops_since_status_log >= self.status_log_interval {
            inner.ops_since_status_log = 0;
            info!(
                sync_job_id = %self.sync_job_id,
                inserted = inner.counters.inserted,
                updated = inner.counters.updated,
                kept = inner.counters.kept,
                skipped = inner.counters.skipped,
                "sync status"
            );
        }

        let sum = inner.counters.sum();
        if sum.saturating_sub(inner.last_published_sum) >= self.publish_threshold {
            inner.last_published_sum = sum;
            let _ = self.counters_tx.send(inner.counters.clone());
        }
    }

    /// Update the distinct-entity-id-per-type tracking used for dedup
    /// accounting and the absolute-state tracker (§4.I, §4.G dedup set).
    pub async fn note_entity_encountered(&self, entity_type: &str, entity_id: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .entities_encountered
            .entry(entity_type.to_string())
            .or_default()
            .insert(entity_id.to_string());
    }

    /// §4.I absolute-state tracker: `insert` increases the total,
    /// `delete` decreases it (clamped at zero), `update` leaves it
    /// unchanged.
    pub async fn update_entity_count(&self, entity_type: &str, action: &str, delta: i64) {
        let should_publish;
        {
            let mut inner = self.inner.lock().await;
            let entry = inner.entity_type_totals.entry(entity_type.to_string()).or_insert(0);
            match action {
                "insert" => *entry += delta,
                "delete" => *entry = (*entry - delta).max(0),
                "update" => {}
                other => tracing::warn!(action = other, "unknown entity count action; ignoring"),
            }
            should_publish = inner.last_state_publish.elapsed() >= self.state_publish_interval;
            if should_publish {
                inner.last_state_publish = Instant::now();
            }
        }
        if should_publish {
            let inner = self.inner.lock().await;
            let _ = self.state_tx.send(StateSnapshot { entity_type_totals: inner.entity_type_totals.clone() });
        }
    }

    pub async fn snapshot(&self) -> CountersSnapshot {
        self.inner.lock().await.counters.clone()
    }

    /// §4.I `finalize`: publish a terminal snapshot exactly once. Calling
    /// this more than once is a no-op on the second call, collapsing the
    /// historical implementation's redundant double-`finalize()` call
    /// (§9 decision) into one guaranteed-single emission.
    pub async fn finalize(&self, status: JobStatus, error: Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.finalized {
            return;
        }
        inner.finalized = true;

        let message = SyncCompleteMessage {
            job_status: status,
            is_complete: matches!(status, JobStatus::Completed),
            is_failed: matches!(status, JobStatus::Failed),
            counters: inner.counters.clone(),
            error: error.or_else(|| {
                matches!(status, JobStatus::Failed).then(|| "Sync failed".to_string())
            }),
        };

        let (level, emoji) = match status {
            JobStatus::Completed => ("info", "✅"),
            JobStatus::Cancelled => ("warn", "⚠️"),
            JobStatus::Failed => ("error", "❌"),
            JobStatus::Running => ("info", "…"),
        };
        if level == "error" {
            tracing::error!(sync_job_id = %self.sync_job_id, status = ?status, "{} sync finished", emoji);
        } else if level == "warn" {
            tracing::warn!(sync_job_id = %self.sync_job_id, status = ?status, "{} sync finished", emoji);
        } else {
            info!(sync_job_id = %self.sync_job_id, status = ?status, "{} sync finished", emoji);
        }

        let _ = self.counters_tx.send(inner.counters.clone());
        let _ = self.state_tx.send(StateSnapshot { entity_type_totals: inner.entity_type_totals.clone() });
        let _ = self.complete_tx.send(message);
    }
}
