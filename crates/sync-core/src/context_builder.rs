//! §4.K Run Context Builder.
//!
//! Loading credentials, destination configs, and the transformer catalog
//! from durable storage is out-of-scope CRUD (§1 "the collection/source-
//! connection CRUD ... are not specified here"); this builder instead
//! takes those resolved collaborators as inputs and owns the one thing
//! that *is* in scope: wiring them into the immutable [`SyncContext`] the
//! rest of the runtime consumes, including the one side effect §4.K calls
//! out explicitly — creating each destination's backing collection if it
//! is absent.
//!
//! Grounded on the general "construct once from resolved config, hand
//! back an assembled object" shape of `holon`'s dependency-injection
//! modules in the retrieval pack, without adopting their DI container:
//! a plain builder struct is proportionate to the handful of components
//! wired here.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use sync_api::dag::{Dag, TransformerRegistry};
use sync_api::ledger::EntityLedger;
use sync_api::traits::{DestinationAdapter, EmbeddingModel, SourceAdapter};

use crate::context::SyncContext;
use crate::progress::ProgressPublisher;
use crate::router::SyncDagRouter;
use crate::settings::SyncSettings;
use crate::token_manager::TokenManager;

/// Everything the builder needs to assemble one run's [`SyncContext`].
/// Each field is already resolved by the embedding host application
/// (credential lookup, adapter construction, transformer catalog load):
/// this struct is the seam between that out-of-scope plane and the sync
/// runtime, not a place to re-implement it.
pub struct RunContextInputs {
    pub sync_id: String,
    pub sync_job_id: String,
    pub collection_id: String,
    pub user_id: Option<String>,
    pub white_label_id: Option<String>,
    pub source: Arc<dyn SourceAdapter>,
    pub destinations: Vec<Arc<dyn DestinationAdapter>>,
    pub embedding_model: Arc<dyn EmbeddingModel>,
    pub dag: Dag,
    pub transformers: TransformerRegistry,
    pub entity_type_definition_ids: BTreeMap<String, String>,
    pub ledger: Arc<dyn EntityLedger>,
    pub token_manager: Option<TokenManager>,
    pub settings: SyncSettings,
}

pub struct RunContextBuilder;

impl RunContextBuilder {
    /// §4.K: ensures every destination's backing collection exists, builds
    /// the router from the DAG and transformer catalog, and returns the
    /// immutable context the orchestrator drives. Fails fast if any
    /// destination's `ensure_collection` call fails — a run with a
    /// destination it cannot reach should not start.
    #[instrument(skip_all, fields(sync_id = %inputs.sync_id, sync_job_id = %inputs.sync_job_id, user_id = inputs.user_id.as_deref()))]
    pub async fn build(inputs: RunContextInputs) -> anyhow::Result<SyncContext> {
        for destination in &inputs.destinations {
            destination
                .ensure_collection(&inputs.collection_id)
                .await
                .map_err(|e| anyhow::Error::new(e).context("ensuring destination collection"))?;
        }
        info!(
            destination_count = inputs.destinations.len(),
            embedding_model = inputs.embedding_model.model_name(),
            "run context destinations ready"
        );

        let router = Arc::new(SyncDagRouter::new(inputs.dag, inputs.transformers));
        let settings = Arc::new(inputs.settings);
        let progress = Arc::new(ProgressPublisher::new(inputs.sync_job_id.clone(), &settings));

        Ok(SyncContext {
            sync_id: inputs.sync_id,
            sync_job_id: inputs.sync_job_id,
            collection_id: inputs.collection_id,
            source: inputs.source,
            destinations: inputs.destinations,
            embedding_model: inputs.embedding_model,
            router,
            ledger: inputs.ledger,
            progress,
            token_manager: inputs.token_manager,
            settings,
            white_label_id: inputs.white_label_id,
            entity_type_definition_ids: inputs.entity_type_definition_ids,
            user_id: inputs.user_id,
        })
    }
}
