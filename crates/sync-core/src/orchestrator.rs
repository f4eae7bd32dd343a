//! §4.J Orchestrator: assembles A-I for one run, drives the pipeline to
//! completion, and finalizes progress exactly once regardless of exit path.
//!
//! Grounded on the historical `SyncOrchestrator.run` (open stream under
//! backpressure, finalize in a `finally` block) — consolidated per the
//! §9 decision into the single bounded-semaphore design, and on the
//! RAII-guard idiom for "run this regardless of how we return" visible in
//! `holon-filesystem`'s watch-task teardown.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use sync_api::error::JobStatus;

use crate::context::SyncContext;
use crate::entity_processor::EntityProcessor;
use crate::worker_pool::WorkerPool;

pub struct Orchestrator;

impl Orchestrator {
    /// §4.J `run`. Returns `Ok(())` on a COMPLETED or CANCELLED run (both
    /// are "the run finished", just with different terminal statuses
    /// already published); returns `Err` only when the run itself could
    /// not proceed (e.g. no source node in the DAG), after finalizing
    /// with FAILED.
    #[instrument(skip_all, fields(sync_id = %ctx.sync_id, sync_job_id = %ctx.sync_job_id))]
    pub async fn run(ctx: &SyncContext, cancel: CancellationToken) -> anyhow::Result<()> {
        let Some(source_node_id) = ctx.router.source_node_id() else {
            let err = anyhow::anyhow!("DAG has no source node");
            ctx.progress.finalize(JobStatus::Failed, Some(err.to_string())).await;
            return Err(err);
        };

        match ctx.source.validate().await {
            Ok(true) => {}
            Ok(false) => {
                let err = anyhow::anyhow!("source failed validation (liveness/authorization check)");
                ctx.progress.finalize(JobStatus::Failed, Some(err.to_string())).await;
                return Err(err);
            }
            Err(source_err) => {
                let err = anyhow::Error::new(source_err).context("source validation failed");
                ctx.progress.finalize(JobStatus::Failed, Some(err.to_string())).await;
                return Err(err);
            }
        }

        let processor = Arc::new(EntityProcessor::new());
        let pool = WorkerPool::new(processor.clone(), ctx.settings.max_workers, ctx.settings.backpressure_threshold());

        let stream = ctx.source.generate_entities().await;
        pool.drive(ctx, source_node_id, stream, cancel.clone()).await;

        if cancel.is_cancelled() {
            warn!("run cancelled; skipping delete-reconciliation pass");
            ctx.progress.finalize(JobStatus::Cancelled, None).await;
            return Ok(());
        }

        if let Err(err) = Self::reconcile_deletes(ctx, &processor).await {
            error!(error = %err, "delete-reconciliation pass failed");
            ctx.progress.finalize(JobStatus::Failed, Some(err.to_string())).await;
            return Err(err);
        }

        info!("run completed");
        ctx.progress.finalize(JobStatus::Completed, None).await;
        Ok(())
    }

    /// §9 open-question decision: diff this run's observed entities
    /// against the ledger and delete whatever disappeared upstream.
    async fn reconcile_deletes(ctx: &SyncContext, processor: &EntityProcessor) -> anyhow::Result<()> {
        let ledger_ids = ctx.ledger.list_entity_ids(&ctx.sync_id).await?;
        let observed: BTreeSet<String> = processor.all_observed_entity_ids();

        let stale: Vec<String> = ledger_ids.into_iter().filter(|id| !observed.contains(id)).collect();
        if stale.is_empty() {
            return Ok(());
        }

        info!(count = stale.len(), "deleting entities no longer present upstream");
        for destination in &ctx.destinations {
            destination.bulk_delete(&stale, &ctx.sync_id).await?;
        }
        for entity_id in &stale {
            ctx.ledger.delete(&ctx.sync_id, entity_id).await?;
        }
        ctx.progress.increment("deleted", stale.len() as u64).await;
        Ok(())
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
    use sync_api::entity::Entity;
    use sync_api::traits::EntityStream;
    use uuid::Uuid;

    struct TwoEntitySource {
        source_id: Uuid,
    }

    #[async_trait::async_trait]
    impl sync_api::traits::SourceAdapter for TwoEntitySource {
        fn short_name(&self) -> &str {
            "two-entity"
        }
        async fn generate_entities(&self) -> EntityStream {
            let entities = vec![Ok(Entity::new("a", "page")), Ok(Entity::new("b", "page"))];
            Box::pin(tokio_stream::iter(entities))
        }
        async fn validate(&self) -> Result<bool, sync_api::error::SourceError> {
            Ok(true)
        }
    }

    fn build_ctx(source_id: Uuid, dest_id: Uuid, ledger: Arc<InMemoryLedger>, destination: Arc<RecordingDestination>) -> SyncContext {
        let dag = Dag {
            edges: vec![DagEdge { from: source_id, to: dest_id, entity_type: "page".into() }],
            nodes: vec![
                DagNode { id: source_id, name: "source".into(), node_type: NodeType::Source },
                DagNode { id: dest_id, name: "dest".into(), node_type: NodeType::Destination },
            ],
        };
        let settings = SyncSettings::default();
        SyncContext {
            sync_id: "sync-1".into(),
            sync_job_id: "job-1".into(),
            collection_id: "col-1".into(),
            source: Arc::new(TwoEntitySource { source_id }),
            destinations: vec![destination],
            embedding_model: Arc::new(StubEmbeddingModel::new(4)),
            router: Arc::new(SyncDagRouter::new(dag, Default::default())),
            ledger,
            progress: Arc::new(ProgressPublisher::new("job-1", &settings)),
            token_manager: None,
            settings: Arc::new(settings),
            white_label_id: None,
            entity_type_definition_ids: Default::default(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn full_run_inserts_both_entities_and_finalizes_completed() {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let ledger = Arc::new(InMemoryLedger::default());
        let destination = Arc::new(RecordingDestination::default());
        let ctx = build_ctx(source_id, dest_id, ledger, destination);
        let mut complete_rx = ctx.progress.subscribe_complete();

        Orchestrator::run(&ctx, CancellationToken::new()).await.unwrap();

        let snapshot = ctx.progress.snapshot().await;
        assert_eq!(snapshot.inserted, 2);

        let msg = complete_rx.try_recv().unwrap();
        assert!(matches!(msg.job_status, JobStatus::Completed));
    }

    #[tokio::test]
    async fn stale_ledger_row_is_deleted_when_not_observed_this_run() {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let ledger = Arc::new(InMemoryLedger::default());
        // Pre-seed a ledger row for an entity the source will not emit this run.
        ledger.create("sync-1", "job-0", "stale-entity", None, "deadbeef").await.unwrap();
        let destination = Arc::new(RecordingDestination::default());
        let ctx = build_ctx(source_id, dest_id, ledger.clone(), destination.clone());

        Orchestrator::run(&ctx, CancellationToken::new()).await.unwrap();

        assert!(ledger.get_by_entity_and_sync_id("sync-1", "stale-entity").await.unwrap().is_none());
        let calls = destination.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c == "delete:stale-entity"));
        assert_eq!(ctx.progress.snapshot().await.deleted, 1);
    }

    #[tokio::test]
    async fn pre_cancelled_run_finalizes_cancelled_and_skips_reconciliation() {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let ledger = Arc::new(InMemoryLedger::default());
        ledger.create("sync-1", "job-0", "stale-entity", None, "deadbeef").await.unwrap();
        let destination = Arc::new(RecordingDestination::default());
        let ctx = build_ctx(source_id, dest_id, ledger.clone(), destination);
        let mut complete_rx = ctx.progress.subscribe_complete();

        let cancel = CancellationToken::new();
        cancel.cancel();
        Orchestrator::run(&ctx, cancel).await.unwrap();

        let msg = complete_rx.try_recv().unwrap();
        assert!(matches!(msg.job_status, JobStatus::Cancelled));
        // Reconciliation was skipped: the stale row must still be present.
        assert!(ledger.get_by_entity_and_sync_id("sync-1", "stale-entity").await.unwrap().is_some());
    }
}
