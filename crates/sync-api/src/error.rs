//! Leaf adapter error taxonomy (§7 ERROR HANDLING DESIGN, §10.2).
//!
//! Each adapter kind gets its own `thiserror`-derived enum scoped to that
//! adapter's failure modes, in the shape of `chron::ChronStreamError` from
//! the retrieval pack: one variant per failure class, each wrapping its
//! `#[source]`. Orchestration layers classify these into the disposition
//! table in §7 rather than propagating them verbatim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error contacting source")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("source rejected credentials (401)")]
    Unauthorized,

    #[error("source returned malformed data: {0}")]
    Deserialize(String),

    #[error("source configuration invalid: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("transport error contacting destination")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("destination rejected request: {0}")]
    Rejected(String),

    #[error("destination collection could not be created: {0}")]
    CollectionSetup(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("transport error contacting embedding API")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("embedding API returned an error: {0}")]
    ApiError(String),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("this token is not refreshable (directly-injected token or API key)")]
    NotRefreshable,

    #[error("no refresh token stored for this connection")]
    NoRefreshToken,

    #[error("refresh request failed: {0}")]
    RefreshFailed(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Terminal status reported on the progress channel (§6, §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// The error surface crossing the run boundary (§6 "Error surface"):
/// a terminal status plus a display string, never a stack trace.
#[derive(Debug, Error)]
#[error("sync run failed: {message}")]
pub struct SyncFailure {
    pub message: String,
}

impl SyncFailure {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self { message: err.to_string() }
    }
}
