//! The immutable per-run bundle (§3 "Run context", §4.K).

use std::collections::BTreeMap;
use std::sync::Arc;

use sync_api::ledger::EntityLedger;
use sync_api::traits::{DestinationAdapter, EmbeddingModel, SourceAdapter};

use crate::progress::ProgressPublisher;
use crate::router::SyncDagRouter;
use crate::settings::SyncSettings;
use crate::token_manager::TokenManager;

/// Per-run immutable bundle wired by the Run Context Builder (§4.K) and
/// consumed by the orchestrator, processor, and router. Cheap to clone:
/// every field is already an `Arc`.
#[derive(Clone)]
pub struct SyncContext {
    pub sync_id: String,
    pub sync_job_id: String,
    pub collection_id: String,
    pub source: Arc<dyn SourceAdapter>,
    pub destinations: Vec<Arc<dyn DestinationAdapter>>,
    pub embedding_model: Arc<dyn EmbeddingModel>,
    pub router: Arc<SyncDagRouter>,
    pub ledger: Arc<dyn EntityLedger>,
    pub progress: Arc<ProgressPublisher>,
    pub token_manager: Option<TokenManager>,
    pub settings: Arc<SyncSettings>,
    pub white_label_id: Option<String>,
    /// §3 "entity-type → entity-definition-id map", consulted by the
    /// absolute-state tracker side of [`ProgressPublisher`] to label
    /// entity-type totals by their host-side definition id rather than
    /// the bare type tag.
    pub entity_type_definition_ids: BTreeMap<String, String>,
    /// §4.K "a dimensioned logger carrying `sync_id`, `sync_job_id`,
    /// `user_id`" — the first two are already `#[instrument]` fields on
    /// every entry point that takes `&SyncContext`; `user_id` is carried
    /// here so those same instrument points can record it too.
    pub user_id: Option<String>,
}
