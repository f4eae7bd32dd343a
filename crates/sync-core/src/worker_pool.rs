//! §4.H Worker Pool: a bounded-concurrency pipeline that drives the entity
//! stream from a source through [`crate::entity_processor::EntityProcessor`].
//!
//! Grounded on the historical `AsyncWorkerPool` (a `asyncio.Semaphore(20)`
//! plus a `set()` of pending tasks) and on the bounded-mailbox idiom in
//! `holon-filesystem`'s file-watch task (spawn one task per unit of work,
//! gate admission on a `Semaphore`, `join` stragglers on shutdown) rather
//! than `futures::stream::buffer_unordered`, so that a single runaway
//! entity cannot block the semaphore forever without also being visible
//! as a slow task in the pending set.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use sync_api::entity::Entity;

use crate::context::SyncContext;
use crate::entity_processor::EntityProcessor;

/// Runs `stream` to completion (or cancellation), feeding every yielded
/// entity through `processor.process`, admitting at most
/// `settings.max_workers` concurrent entities and refusing to admit more
/// than `settings.backpressure_threshold()` pending tasks at once (§4.H
/// "Backpressure").
pub struct WorkerPool {
    processor: Arc<EntityProcessor>,
    semaphore: Arc<Semaphore>,
    backpressure_threshold: usize,
}

impl WorkerPool {
    pub fn new(processor: Arc<EntityProcessor>, max_workers: usize, backpressure_threshold: usize) -> Self {
        Self { processor, semaphore: Arc::new(Semaphore::new(max_workers)), backpressure_threshold }
    }

    /// Drain `stream`, spawning one task per entity. Returns once every
    /// admitted task has completed, or early if `cancel` fires — in which
    /// case already-spawned tasks are still awaited to completion (§4.H
    /// "cooperative, not abrupt, cancellation").
    #[instrument(skip_all, fields(sync_job_id = %ctx.sync_job_id))]
    pub async fn drive(
        &self,
        ctx: &SyncContext,
        source_node_id: uuid::Uuid,
        mut stream: sync_api::traits::EntityStream,
        cancel: CancellationToken,
    ) {
        use futures::StreamExt;

        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            if cancel.is_cancelled() {
                warn!("cancellation requested; no longer admitting new entities");
                break;
            }

            if tasks.len() >= self.backpressure_threshold {
                // Too many tasks in flight; drain one before admitting more.
                tasks.join_next().await;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => item,
            };

            let entity: Entity = match next {
                Some(Ok(entity)) => entity,
                Some(Err(err)) => {
                    warn!(error = %err, "source stream yielded an error; counting as skipped");
                    ctx.progress.increment("skipped", 1).await;
                    continue;
                }
                None => break,
            };

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed: pool is shutting down
            };

            let processor = self.processor.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                processor.process(&ctx, source_node_id, entity).await;
            });
        }

        // Drain stragglers, bounded by a coarse timeout so a stuck task
        // cannot wedge shutdown forever (§4.H "drain timeout").
        let drain = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while tasks.join_next().await.is_some() {}
        });
        if drain.await.is_err() {
            warn!("timed out waiting for in-flight entities to drain");
        }
    }
}
