//! §4.G Entity Processor: the per-entity state machine.
//!
//! ```text
//! ENRICH -> DETERMINE_ACTION -+- KEEP   -> release, increment(kept)
//!                             +- INSERT -> TRANSFORM -> EMBED -> PERSIST_INSERT -> increment(inserted)
//!                             +- UPDATE -> TRANSFORM -> EMBED -> PERSIST_UPDATE -> increment(updated)
//! ```
//!
//! Grounded on the historical `EntityProcessor.process` (dedup-by-seen-set,
//! stage ordering, per-stage counters) with the persist ordering corrected
//! to destination-then-ledger per §4.E's stated transaction discipline
//! (the historical `_persist_entities` wrote the ledger row first; this
//! repo follows the invariant the specification states explicitly rather
//! than the historical code's actual order — see DESIGN.md).

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use sync_api::entity::{DestinationAction, Entity};

use crate::context::SyncContext;

pub struct EntityProcessor {
    /// In-memory per-run dedup set (§4.G "Deduplication of re-emitted
    /// entities"): `entity_type -> seen entity_ids`.
    entities_encountered: DashMap<String, BTreeSet<String>>,
}

impl Default for EntityProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityProcessor {
    pub fn new() -> Self {
        Self { entities_encountered: DashMap::new() }
    }

    /// Process one entity through the full pipeline. Never propagates an
    /// error (§4.G "Failure semantics"): any uncaught exception is logged,
    /// counted once as `skipped`, and swallowed so the run continues.
    #[instrument(skip(self, ctx, entity), fields(entity_id = %entity.entity_id, entity_type = %entity.entity_type))]
    pub async fn process(&self, ctx: &SyncContext, source_node_id: Uuid, mut entity: Entity) -> Vec<Entity> {
        let entity_type = entity.entity_type.clone();
        let entity_id = entity.entity_id.clone();

        let first_sighting = {
            let mut seen = self.entities_encountered.entry(entity_type.clone()).or_default();
            seen.insert(entity_id.clone())
        };
        if !first_sighting {
            info!("already encountered this entity in this run; silently skipping");
            return Vec::new();
        }
        ctx.progress.note_entity_encountered(&entity_type, &entity_id).await;

        let mut accounted_for = false;
        let result = self.process_inner(ctx, source_node_id, &mut entity, &mut accounted_for).await;

        match result {
            Ok(produced) => produced,
            Err(err) => {
                error!(error = %err, "error processing entity");
                if !accounted_for {
                    ctx.progress.increment("skipped", 1).await;
                }
                Vec::new()
            }
        }
    }

    async fn process_inner(
        &self,
        ctx: &SyncContext,
        source_node_id: Uuid,
        entity: &mut Entity,
        accounted_for: &mut bool,
    ) -> anyhow::Result<Vec<Entity>> {
        self.enrich(ctx, entity);

        let action = self.determine_action(ctx, entity).await?;

        if action == DestinationAction::Keep {
            ctx.progress.increment("kept", 1).await;
            *accounted_for = true;
            return Ok(Vec::new());
        }

        let current_hash = entity.hash();
        let transformed = match ctx.router.process_entity(source_node_id, entity.clone()).await {
            Ok(produced) => produced,
            Err(err) => {
                warn!(error = %err, "transformer raised; counting entity as skipped");
                ctx.progress.increment("skipped", 1).await;
                *accounted_for = true;
                return Ok(Vec::new());
            }
        };

        if transformed.is_empty() {
            warn!("transformation produced zero entities; counting as skipped");
            ctx.progress.increment("skipped", 1).await;
            *accounted_for = true;
            return Ok(Vec::new());
        }

        let embedded = match self.embed(ctx, transformed).await {
            Ok(embedded) => embedded,
            Err(err) => {
                warn!(error = %err, "embedding failed; counting entity as skipped");
                ctx.progress.increment("skipped", 1).await;
                *accounted_for = true;
                return Ok(Vec::new());
            }
        };

        self.persist(ctx, entity, embedded.clone(), action, &current_hash).await?;
        *accounted_for = true;
        Ok(embedded)
    }

    /// ENRICH: idempotent metadata stamping.
    fn enrich(&self, ctx: &SyncContext, entity: &mut Entity) {
        entity.system_metadata.source_name = Some(ctx.source.short_name().to_string());
        entity.system_metadata.sync_id = Some(ctx.sync_id.clone());
        entity.system_metadata.sync_job_id = Some(ctx.sync_job_id.clone());
        if let Some(wl) = &ctx.white_label_id {
            entity.system_metadata.white_label_id = Some(wl.clone());
        }
    }

    /// DETERMINE_ACTION: consult the ledger for this entity's prior hash.
    async fn determine_action(&self, ctx: &SyncContext, entity: &mut Entity) -> anyhow::Result<DestinationAction> {
        let current_hash = entity.hash();
        let existing = ctx.ledger.get_by_entity_and_sync_id(&ctx.sync_id, &entity.entity_id).await?;
        Ok(match existing {
            None => DestinationAction::Insert,
            Some(row) if row.hash == current_hash => DestinationAction::Keep,
            Some(_) => DestinationAction::Update,
        })
    }

    /// EMBED: serialize each entity's storage-dict projection, embed as a
    /// batch, assign positionally (§4.G "Preserve positional alignment").
    async fn embed(&self, ctx: &SyncContext, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>> {
        let texts: Vec<String> = entities
            .iter()
            .map(|e| serde_json::to_string(&e.to_storage_dict()).unwrap_or_default())
            .collect();

        let vectors = ctx.embedding_model.embed_many(&texts).await?;
        if vectors.len() != entities.len() {
            warn!(
                expected = entities.len(),
                got = vectors.len(),
                "embedding count mismatch; proceeding with what is present"
            );
        }

        let mut out = entities;
        for (entity, vector) in out.iter_mut().zip(vectors.into_iter()) {
            entity.vector = Some(vector);
        }
        Ok(out)
    }

    /// PERSIST_INSERT / PERSIST_UPDATE: destination writes precede the
    /// ledger write (§4.E transaction discipline).
    async fn persist(
        &self,
        ctx: &SyncContext,
        parent: &mut Entity,
        mut produced: Vec<Entity>,
        action: DestinationAction,
        current_hash: &str,
    ) -> anyhow::Result<()> {
        for child in produced.iter_mut() {
            if child.parent_entity_id.is_none() {
                child.parent_entity_id = Some(parent.entity_id.clone());
            }
        }

        // §3 "entity-type → entity-definition-id map": the absolute-state
        // tracker labels totals by the host's definition id when one is
        // configured for this entity type, falling back to the bare type
        // tag for entity types the host never registered (e.g. synthetic
        // "_parent" types introduced by a transformer).
        let count_label = ctx
            .entity_type_definition_ids
            .get(&parent.entity_type)
            .cloned()
            .unwrap_or_else(|| parent.entity_type.clone());

        match action {
            DestinationAction::Insert => {
                for destination in &ctx.destinations {
                    destination.bulk_insert(&produced).await?;
                }
                ctx.ledger
                    .create(&ctx.sync_id, &ctx.sync_job_id, &parent.entity_id, parent.parent_entity_id.as_deref(), current_hash)
                    .await?;
                ctx.progress.increment("inserted", 1).await;
                ctx.progress.update_entity_count(&count_label, "insert", 1).await;
            }
            DestinationAction::Update => {
                for destination in &ctx.destinations {
                    destination.bulk_delete_by_parent_id(&parent.entity_id, &ctx.sync_id).await?;
                    destination.bulk_insert(&produced).await?;
                }
                ctx.ledger.update(&ctx.sync_id, &parent.entity_id, current_hash).await?;
                ctx.progress.increment("updated", 1).await;
                ctx.progress.update_entity_count(&count_label, "update", 0).await;
            }
            DestinationAction::Keep => unreachable!("KEEP returns before persist is called"),
        }
        Ok(())
    }

    /// Snapshot of every entity id observed this run for one entity type,
    /// used by the orchestrator's end-of-run delete-reconciliation pass.
    pub fn observed_entity_ids(&self, entity_type: &str) -> BTreeSet<String> {
        self.entities_encountered.get(entity_type).map(|s| s.clone()).unwrap_or_default()
    }

    /// Every entity id observed this run, across all entity types. The
    /// ledger keys rows by `(sync_id, entity_id)` alone, so reconciliation
    /// diffs against the flattened set rather than per-type sets.
    pub fn all_observed_entity_ids(&self) -> BTreeSet<String> {
        self.entities_encountered.iter().flat_map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressPublisher;
    use crate::router::SyncDagRouter;
    use crate::settings::SyncSettings;
    use crate::testing::{InMemoryLedger, RecordingDestination, StubEmbeddingModel, StubSource};
    use sync_api::dag::{Dag, DagEdge, DagNode, NodeType};

    fn build_context() -> (SyncContext, Uuid, Arc<RecordingDestination>) {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let dag = Dag {
            edges: vec![DagEdge { from: source_id, to: dest_id, entity_type: "page".into() }],
            nodes: vec![
                DagNode { id: source_id, name: "source".into(), node_type: NodeType::Source },
                DagNode { id: dest_id, name: "dest".into(), node_type: NodeType::Destination },
            ],
        };
        let settings = SyncSettings::default();
        let destination = Arc::new(RecordingDestination::default());
        let ctx = SyncContext {
            sync_id: "sync-1".into(),
            sync_job_id: "job-1".into(),
            collection_id: "col-1".into(),
            source: Arc::new(StubSource::default()),
            destinations: vec![destination.clone()],
            embedding_model: Arc::new(StubEmbeddingModel::new(4)),
            router: Arc::new(SyncDagRouter::new(dag, Default::default())),
            ledger: Arc::new(InMemoryLedger::default()),
            progress: Arc::new(ProgressPublisher::new("job-1", &settings)),
            token_manager: None,
            settings: Arc::new(settings),
            white_label_id: None,
            entity_type_definition_ids: Default::default(),
            user_id: None,
        };
        (ctx, source_id, destination)
    }

    #[tokio::test]
    async fn first_sighting_inserts_and_second_sighting_is_kept() {
        let (ctx, source_id, _destination) = build_context();
        let processor = EntityProcessor::new();

        let entity = Entity::new("a", "page").with_field("title", "x");
        let produced = processor.process(&ctx, source_id, entity.clone()).await;
        assert_eq!(produced.len(), 1);
        assert_eq!(ctx.progress.snapshot().await.inserted, 1);

        let produced_again = processor.process(&ctx, source_id, entity).await;
        assert_eq!(produced_again.len(), 1);
        let snapshot = ctx.progress.snapshot().await;
        assert_eq!(snapshot.inserted, 1);
        assert_eq!(snapshot.kept, 1);
    }

    #[tokio::test]
    async fn update_changes_hash_and_deletes_before_insert() {
        let (ctx, source_id, destination) = build_context();
        let processor = EntityProcessor::new();

        processor.process(&ctx, source_id, Entity::new("a", "page").with_field("title", "x")).await;
        processor.process(&ctx, source_id, Entity::new("a", "page").with_field("title", "x2")).await;

        let snapshot = ctx.progress.snapshot().await;
        assert_eq!(snapshot.inserted, 1);
        assert_eq!(snapshot.updated, 1);

        let calls = destination.calls.lock().unwrap();
        let delete_idx = calls.iter().position(|c| c == "delete_by_parent:a").unwrap();
        let last_insert_idx = calls.iter().rposition(|c| c.starts_with("insert")).unwrap();
        assert!(delete_idx < last_insert_idx, "delete-by-parent must precede the following insert");
    }

    #[tokio::test]
    async fn re_emission_within_one_run_is_silently_dropped() {
        let (ctx, source_id, _destination) = build_context();
        let processor = EntityProcessor::new();
        let entity = Entity::new("dup", "page").with_field("title", "x");

        processor.process(&ctx, source_id, entity.clone()).await;
        let second = processor.process(&ctx, source_id, entity).await;
        assert!(second.is_empty());

        // Only one action should have been counted (insert), not a second kept/skip.
        let snapshot = ctx.progress.snapshot().await;
        assert_eq!(snapshot.sum(), 1);
    }
}
