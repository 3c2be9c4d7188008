//! The file-mover pipeline: list, batch, move one object at a time.

use crate::errors::RelayError;
use crate::models::batch::{BatchResult, ExecutionResult, TransferRequest, round_secs};
use crate::models::object::ObjectRecord;
use crate::services::lister::{KeyFilter, ListerConfig, ResilientLister};
use crate::services::partition::{batch_count, partition};
use crate::services::store::ObjectStore;
use crate::services::transfer::{TransferWorker, destination_key};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::info;

/// Pause between consecutive batches to bound the request rate.
const BATCH_PAUSE: Duration = Duration::from_millis(100);

pub enum MoveOutcome {
    NothingToMove,
    Moved(ExecutionResult),
}

/// List the source prefix and move everything found.
pub async fn run_move(
    store: &dyn ObjectStore,
    lister_config: &ListerConfig,
    req: &TransferRequest,
) -> Result<MoveOutcome, RelayError> {
    info!(
        source = %format!("{}/{}", req.source_bucket, req.source_prefix),
        dest = %format!("{}/{}", req.dest_bucket, req.dest_prefix),
        "starting move"
    );

    let files = ResilientLister::new(store, lister_config, KeyFilter::Any)
        .list(&req.source_bucket, &req.source_prefix, req.max_objects)
        .await?;

    if files.is_empty() {
        info!(bucket = %req.source_bucket, "no objects to move");
        return Ok(MoveOutcome::NothingToMove);
    }

    let result = move_in_batches(store, &files, req).await?;
    info!(
        moved = result.success_count,
        failed = result.error_count,
        elapsed_seconds = result.elapsed_seconds,
        "move finished"
    );
    Ok(MoveOutcome::Moved(result))
}

/// Sequentially move `files` in batches of `req.batch_size`.
pub async fn move_in_batches(
    store: &dyn ObjectStore,
    files: &[ObjectRecord],
    req: &TransferRequest,
) -> Result<ExecutionResult, RelayError> {
    let started = Instant::now();
    let worker = TransferWorker::new(store);
    let total = batch_count(files.len(), req.batch_size);
    let mut result = ExecutionResult::default();

    for (index, batch) in partition(files, req.batch_size)?.enumerate() {
        info!(batch = index + 1, of = total, objects = batch.len(), "moving batch");
        result.absorb(move_batch(&worker, batch, req).await);

        if index + 1 < total {
            sleep(BATCH_PAUSE).await;
        }
    }

    result.elapsed_seconds = round_secs(started.elapsed().as_secs_f64());
    Ok(result)
}

async fn move_batch(
    worker: &TransferWorker<'_>,
    batch: &[ObjectRecord],
    req: &TransferRequest,
) -> BatchResult {
    let mut counts = BatchResult::default();
    for obj in batch {
        let dest_key = destination_key(&obj.key, &req.source_prefix, &req.dest_prefix);
        if worker
            .move_object(&req.source_bucket, &obj.key, &req.dest_bucket, &dest_key)
            .await
        {
            counts.success_count += 1;
        } else {
            counts.error_count += 1;
        }
    }
    counts
}
