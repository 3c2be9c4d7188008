//! The CSV-merge pipeline.
//!
//! Every source object is a small CSV whose first line is a header and whose
//! second line is the only data row worth keeping. Batches are read
//! concurrently on a bounded pool; each batch task returns an owned
//! [`BatchContribution`] and a single collector assembles the output once all
//! tasks have completed, so no state is shared between tasks.
//!
//! The merged file carries exactly one header: the one from the
//! lowest-numbered batch that produced any valid row. Rows follow grouped by
//! batch number.

use crate::errors::RelayError;
use crate::models::batch::{MergeOutcome, MergeRequest, round_secs};
use crate::models::object::ObjectRecord;
use crate::services::lister::{KeyFilter, ListerConfig, ResilientLister};
use crate::services::partition::{batch_count, partition};
use crate::services::store::ObjectStore;
use crate::services::transfer::{TransferWorker, join_key};
use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on batches read at the same time.
pub const MAX_CONCURRENT_BATCHES: usize = 10;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// What one batch task hands back to the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchContribution {
    pub index: usize,
    /// Header of the first valid object in the batch.
    pub header: Option<String>,
    pub rows: Vec<String>,
    pub files_processed: usize,
    /// Objects that could not be read or had fewer than two lines.
    pub skipped: usize,
}

/// Collected output of a whole merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedCsv {
    pub text: String,
    pub files_processed: usize,
    pub total_rows: usize,
    pub skipped: usize,
}

pub enum MergeRun {
    NothingToMerge,
    Merged(MergeOutcome),
}

/// List the CSV objects under the source prefix and merge them into one
/// object under the destination prefix.
pub async fn run_merge(
    store: &dyn ObjectStore,
    lister_config: &ListerConfig,
    req: &MergeRequest,
) -> Result<MergeRun, RelayError> {
    let t = &req.transfer;
    info!(
        source = %format!("{}/{}", t.source_bucket, t.source_prefix),
        dest = %format!("{}/{}", t.dest_bucket, t.dest_prefix),
        output = %req.output_filename,
        "starting CSV merge"
    );

    let mut files = ResilientLister::new(store, lister_config, KeyFilter::Csv)
        .list(&t.source_bucket, &t.source_prefix, t.max_objects)
        .await?;

    if let Some((start, end)) = req.range {
        files = files.into_iter().skip(start).take(end - start).collect();
    }

    if files.is_empty() {
        info!(bucket = %t.source_bucket, "no CSV objects to merge");
        return Ok(MergeRun::NothingToMerge);
    }

    let outcome = merge_objects(store, &files, req).await?;
    info!(
        files_processed = outcome.files_processed,
        total_rows = outcome.total_rows,
        skipped = outcome.skipped,
        output = %outcome.output_file,
        "CSV merge finished"
    );
    Ok(MergeRun::Merged(outcome))
}

/// Merge `files` and write the result. Failing to write the output is fatal.
pub async fn merge_objects(
    store: &dyn ObjectStore,
    files: &[ObjectRecord],
    req: &MergeRequest,
) -> Result<MergeOutcome, RelayError> {
    let started = Instant::now();
    let t = &req.transfer;
    let worker = TransferWorker::new(store);

    let pool = batch_count(files.len(), t.batch_size).clamp(1, MAX_CONCURRENT_BATCHES);
    // Built up front: a mapping closure held across the await makes the
    // future non-`Send`, which the HTTP handler cannot accept.
    let tasks: Vec<_> = partition(files, t.batch_size)?
        .enumerate()
        .map(|(index, batch)| merge_batch(&worker, &t.source_bucket, index, batch))
        .collect();
    let contributions: Vec<BatchContribution> = stream::iter(tasks)
        .buffer_unordered(pool)
        .collect()
        .await;

    let merged = assemble(contributions);

    let output_key = join_key(&t.dest_prefix, &req.output_filename);
    store
        .put_object(
            &t.dest_bucket,
            &output_key,
            CSV_CONTENT_TYPE,
            Bytes::from(merged.text),
        )
        .await
        .inspect_err(|err| {
            error!(key = %output_key, code = err.code(), error = %err, "writing merged CSV failed")
        })?;

    let output_file = store.location(&t.dest_bucket, &output_key);
    info!(output = %output_file, "merged CSV written");

    Ok(MergeOutcome {
        files_processed: merged.files_processed,
        total_rows: merged.total_rows,
        skipped: merged.skipped,
        output_file,
        elapsed_seconds: round_secs(started.elapsed().as_secs_f64()),
    })
}

/// Read every object of one batch and keep its header and first data row.
pub async fn merge_batch(
    worker: &TransferWorker<'_>,
    bucket: &str,
    index: usize,
    batch: &[ObjectRecord],
) -> BatchContribution {
    let mut part = BatchContribution {
        index,
        ..Default::default()
    };

    for obj in batch {
        let Some(text) = worker.read_text(bucket, &obj.key).await else {
            part.skipped += 1;
            continue;
        };

        let mut lines = text.trim().lines();
        let (Some(header), Some(row)) = (lines.next(), lines.next()) else {
            warn!(key = %obj.key, "CSV has fewer than 2 lines, skipping");
            part.skipped += 1;
            continue;
        };

        match &part.header {
            None => part.header = Some(header.to_string()),
            Some(kept) if kept != header => {
                warn!(key = %obj.key, "CSV header differs from the batch header")
            }
            Some(_) => {}
        }
        part.rows.push(row.to_string());
        part.files_processed += 1;
        debug!(key = %obj.key, "CSV row collected");
    }

    part
}

/// Combine batch contributions in batch order behind a single header.
pub fn assemble(mut parts: Vec<BatchContribution>) -> MergedCsv {
    parts.sort_by_key(|part| part.index);

    let mut merged = MergedCsv::default();
    let mut header: Option<String> = None;

    for part in parts {
        merged.files_processed += part.files_processed;
        merged.skipped += part.skipped;

        if let Some(candidate) = part.header {
            match &header {
                None => {
                    merged.text.push_str(&candidate);
                    merged.text.push('\n');
                    header = Some(candidate);
                }
                Some(kept) if *kept != candidate => {
                    warn!(batch = part.index + 1, "batch header differs from the merged header")
                }
                Some(_) => {}
            }
        }

        for row in part.rows {
            merged.text.push_str(&row);
            merged.text.push('\n');
            merged.total_rows += 1;
        }
    }

    merged
}
