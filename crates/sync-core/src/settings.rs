//! Run-level tunables (§10.3). A plain constructible struct — this engine
//! embeds as a library inside a host application that owns its own
//! configuration system, so there is no global config singleton here.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SyncSettings {
    /// §4.H `MAX_WORKERS`.
    pub max_workers: usize,
    /// §4.D `REFRESH_INTERVAL_SECONDS` (25 minutes in the historical
    /// implementation).
    pub token_refresh_interval: Duration,
    /// §4.I `PUBLISH_THRESHOLD`.
    pub publish_threshold: u64,
    /// §4.I human-readable status log cadence.
    pub status_log_interval: u64,
    /// §4.I absolute-state tracker publish rate limit.
    pub state_publish_interval: Duration,
    /// §4.F chunker bound: `MAX_CHUNK_SIZE - METADATA_OVERHEAD - SAFETY_MARGIN`.
    pub max_chunk_size: usize,
    pub chunk_metadata_overhead: usize,
    pub chunk_safety_margin: usize,
    /// Coarse timeout for draining in-flight tasks on stream close (§4.H).
    pub drain_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_workers: 20,
            token_refresh_interval: Duration::from_secs(25 * 60),
            publish_threshold: 3,
            status_log_interval: 50,
            state_publish_interval: Duration::from_millis(500),
            max_chunk_size: 1000,
            chunk_metadata_overhead: 50,
            chunk_safety_margin: 50,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncSettings {
    /// Read overrides from the environment, falling back to [`Default`].
    /// Mirrors the layered-config idiom visible in the retrieval pack
    /// (figment-backed settings in the `beiju-mmoldb` crates) without
    /// taking on a config-file-format dependency this engine doesn't need.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_usize("SYNC_MAX_WORKERS").unwrap_or(defaults.max_workers),
            token_refresh_interval: env_secs("SYNC_TOKEN_REFRESH_INTERVAL_SECONDS")
                .unwrap_or(defaults.token_refresh_interval),
            publish_threshold: env_u64("SYNC_PUBLISH_THRESHOLD").unwrap_or(defaults.publish_threshold),
            status_log_interval: env_u64("SYNC_STATUS_LOG_INTERVAL").unwrap_or(defaults.status_log_interval),
            ..defaults
        }
    }

    pub fn effective_chunk_size(&self) -> usize {
        self.max_chunk_size
            .saturating_sub(self.chunk_metadata_overhead)
            .saturating_sub(self.chunk_safety_margin)
    }

    /// §4.H backpressure trigger: `2 * MAX_WORKERS`.
    pub fn backpressure_threshold(&self) -> usize {
        self.max_workers * 2
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}
