//! Message schemas published on the two progress channels (§4.I, §6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::JobStatus;

/// Published on `sync_job:<job_id>` whenever the counters tracker crosses
/// `PUBLISH_THRESHOLD` (§4.I).
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub inserted: u64,
    pub updated: u64,
    pub kept: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub entities_encountered: BTreeMap<String, u64>,
}

impl CountersSnapshot {
    pub fn sum(&self) -> u64 {
        self.inserted + self.updated + self.kept + self.deleted + self.skipped
    }
}

/// Published on `sync_job_state:<job_id>`, rate-limited to 500ms (§4.I).
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub entity_type_totals: BTreeMap<String, i64>,
}

/// Emitted once by each tracker's `finalize` (§4.I, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncCompleteMessage {
    pub job_status: JobStatus,
    pub is_complete: bool,
    pub is_failed: bool,
    pub counters: CountersSnapshot,
    pub error: Option<String>,
}
