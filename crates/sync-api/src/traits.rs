//! The three pluggable interfaces (§9 "Pluggable sources/destinations/
//! transformers"): Source Adapter (§4.A), Destination Adapter (§4.B),
//! Embedding Model (§4.C), plus the Transformer contract used by the DAG
//! Router (§4.F).

use async_trait::async_trait;
use tokio_stream::Stream;
use std::pin::Pin;

use crate::entity::Entity;
use crate::error::{DestinationError, EmbeddingError, SourceError};

pub type EntityStream = Pin<Box<dyn Stream<Item = Result<Entity, SourceError>> + Send>>;

/// §4.A. A source yields a single-producer, consume-once stream of
/// entities. Implementations MUST NOT assume they run to completion and
/// MUST tolerate cancellation between yields.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used for registry lookups and log dimensions.
    fn short_name(&self) -> &str;

    /// Begin producing the entity stream. Called at most once per run.
    async fn generate_entities(&self) -> EntityStream;

    /// Liveness + authorization check (§4.A). OAuth2 sources should
    /// implement this via the shared `validate_oauth2` helper in
    /// `sync-sources`.
    async fn validate(&self) -> Result<bool, SourceError>;

    /// Default cursor field for incremental sync, if this source has one.
    fn default_cursor_field(&self) -> Option<&str> {
        None
    }

    /// Validate a user-supplied cursor field name. Sources without cursor
    /// constraints accept anything.
    fn validate_cursor_field(&self, _field: &str) -> Result<(), SourceError> {
        Ok(())
    }
}

/// A single nearest-neighbor hit (§4.B `search`), used by the search plane.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
    pub entity_id: String,
    pub score: f32,
}

/// §4.B. Vector-database destination contract.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// Construct and connect; MUST be idempotent (create-if-missing).
    async fn ensure_collection(&self, collection_id: &str) -> Result<(), DestinationError>;

    /// Upsert, keyed by the entity's durable per-record id.
    async fn bulk_insert(&self, entities: &[Entity]) -> Result<(), DestinationError>;

    /// Delete by explicit ids, scoped to `sync_id`.
    async fn bulk_delete(&self, entity_ids: &[String], sync_id: &str) -> Result<(), DestinationError>;

    /// Delete all children of `parent_id` within `sync_id`'s scope. Used to
    /// implement UPDATE (§4.G PERSIST_UPDATE): delete-before-insert.
    async fn bulk_delete_by_parent_id(
        &self,
        parent_id: &str,
        sync_id: &str,
    ) -> Result<(), DestinationError>;

    /// Nearest-neighbor lookup (§4.B). Belongs to the search plane, not the
    /// sync plane this workspace implements; adapters that only serve sync
    /// runs may leave the default in place.
    async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<SearchHit>, DestinationError> {
        Err(DestinationError::Rejected("search is not implemented by the sync runtime".into()))
    }
}

/// §4.C. `embed_many` preserves positional alignment with its input;
/// `embed_many(&[])` yields `[]`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_many(&[text.to_string()]).await?.into_iter().next().unwrap_or_default())
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// §4.F. Transformers are pure functions of their input entity: no external
/// state, may produce zero, one, or many entities.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, entity: Entity) -> anyhow::Result<Vec<Entity>>;
}
