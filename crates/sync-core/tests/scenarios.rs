//! §8 scenario tests S5 (a bad entity does not kill the run) and S7
//! (cancellation mid-run stops admission and finalizes CANCELLED), driven
//! through the public [`Orchestrator`] rather than the processor directly
//! so these exercise the same path a real run takes.

use std::sync::Arc;

use sync_api::dag::{Dag, DagEdge, DagNode, NodeType};
use sync_api::entity::Entity;
use sync_api::error::{JobStatus, SourceError};
use sync_api::traits::{EntityStream, SourceAdapter};
use sync_core::progress::ProgressPublisher;
use sync_core::router::SyncDagRouter;
use sync_core::testing::{InMemoryLedger, RecordingDestination, StubEmbeddingModel};
use sync_core::{Orchestrator, SyncContext, SyncSettings};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn build_ctx(source: Arc<dyn SourceAdapter>) -> (SyncContext, Arc<InMemoryLedger>, Arc<RecordingDestination>) {
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
    let ledger = Arc::new(InMemoryLedger::default());
    let destination = Arc::new(RecordingDestination::default());
    let ctx = SyncContext {
        sync_id: "sync-1".into(),
        sync_job_id: "job-1".into(),
        collection_id: "col-1".into(),
        source,
        destinations: vec![destination.clone()],
        embedding_model: Arc::new(StubEmbeddingModel::new(4)),
        router: Arc::new(SyncDagRouter::new(dag, Default::default())),
        ledger: ledger.clone(),
        progress: Arc::new(ProgressPublisher::new("job-1", &settings)),
        token_manager: None,
        settings: Arc::new(settings),
        white_label_id: None,
        entity_type_definition_ids: Default::default(),
        user_id: None,
    };
    (ctx, ledger, destination)
}

/// A source whose stream yields one transient error between two good
/// entities, the way a flaky upstream page fetch would (S5).
struct FlakySource;

#[async_trait::async_trait]
impl SourceAdapter for FlakySource {
    fn short_name(&self) -> &str {
        "flaky"
    }

    async fn generate_entities(&self) -> EntityStream {
        let entities: Vec<Result<Entity, SourceError>> = vec![
            Ok(Entity::new("a", "page")),
            Err(SourceError::Deserialize("upstream hiccup".into())),
            Ok(Entity::new("b", "page")),
        ];
        Box::pin(tokio_stream::iter(entities))
    }

    async fn validate(&self) -> Result<bool, SourceError> {
        Ok(true)
    }
}

#[tokio::test]
async fn poison_entity_is_skipped_and_the_run_still_completes() {
    let (ctx, _ledger, destination) = build_ctx(Arc::new(FlakySource));
    let mut complete_rx = ctx.progress.subscribe_complete();

    Orchestrator::run(&ctx, CancellationToken::new()).await.unwrap();

    let snapshot = ctx.progress.snapshot().await;
    assert_eq!(snapshot.inserted, 2);
    assert_eq!(snapshot.skipped, 1);

    let msg = complete_rx.try_recv().unwrap();
    assert!(matches!(msg.job_status, JobStatus::Completed));

    let calls = destination.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c == "insert:a"));
    assert!(calls.iter().any(|c| c == "insert:b"));
}

/// A source that never ends on its own and throttles emission so the test
/// has a window in which to cancel mid-stream; only cancellation stops it
/// (S7 "cancel after N entities persisted").
struct ThrottledUnboundedSource;

#[async_trait::async_trait]
impl SourceAdapter for ThrottledUnboundedSource {
    fn short_name(&self) -> &str {
        "throttled-unbounded"
    }

    async fn generate_entities(&self) -> EntityStream {
        let stream = futures::stream::unfold(0usize, |i| async move {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            Some((Ok(Entity::new(format!("e{i}"), "page")), i + 1))
        });
        Box::pin(stream)
    }

    async fn validate(&self) -> Result<bool, SourceError> {
        Ok(true)
    }
}

#[tokio::test]
async fn cancelling_mid_run_stops_admission_and_finalizes_cancelled() {
    let (ctx, _ledger, destination) = build_ctx(Arc::new(ThrottledUnboundedSource));
    let mut complete_rx = ctx.progress.subscribe_complete();

    let cancel = CancellationToken::new();
    let run_ctx = ctx.clone();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { Orchestrator::run(&run_ctx, run_cancel).await });

    // Let a handful of entities persist, then cancel — the run must stop
    // admitting new work rather than draining the (effectively infinite)
    // stream to completion.
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let inserted_count = destination.calls.lock().unwrap().len();
    assert!(inserted_count > 0, "expected at least some entities to have been persisted before cancellation");
    // Bounded by "a bit more than observed at cancel time" rather than an
    // exact count: admitted-but-in-flight tasks still finish draining.
    assert!(inserted_count < 10_000, "cancellation should have stopped admission of new entities");

    let msg = complete_rx.try_recv().unwrap();
    assert!(matches!(msg.job_status, JobStatus::Cancelled));
}
