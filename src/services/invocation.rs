//! The invocation boundary: raw event in, response envelope out.
//!
//! Configuration problems fail the invocation before any store I/O. The store
//! handle is owned by the caller (the HTTP server state or a one-shot CLI run)
//! and borrowed for the duration of one invocation.

use crate::errors::RelayError;
use crate::models::request::{AggregateEvent, EventDefaults, MergeEvent, MoveEvent, PlanEvent};
use crate::models::response::{
    AggregateBody, FailureBody, InvocationResponse, PlanBody, PlannedBatch, STATUS_FAILED,
    STATUS_OK, TransferBody,
};
use crate::services::aggregator::run_aggregate;
use crate::services::lister::ListerConfig;
use crate::services::merge::{MergeRun, run_merge};
use crate::services::mover::{MoveOutcome, run_move};
use crate::services::planner::plan;
use crate::services::store::ObjectStore;
use clap::ValueEnum;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info};

/// Process-wide settings shared by every invocation.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub defaults: EventDefaults,
    pub lister: ListerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Move,
    Merge,
    Plan,
    Aggregate,
}

/// Run one invocation from an untyped event.
pub async fn invoke(
    kind: InvocationKind,
    store: &dyn ObjectStore,
    settings: &RelaySettings,
    event: Value,
) -> InvocationResponse {
    match kind {
        InvocationKind::Move => match parse(event) {
            Ok(event) => invoke_move(store, settings, event).await,
            Err(err) => transfer_failure(err),
        },
        InvocationKind::Merge => match parse(event) {
            Ok(event) => invoke_merge(store, settings, event).await,
            Err(err) => transfer_failure(err),
        },
        InvocationKind::Plan => match parse(event) {
            Ok(event) => invoke_plan(settings, event),
            Err(err) => flat_failure(err, "batch planning failed"),
        },
        InvocationKind::Aggregate => match parse(event) {
            Ok(event) => invoke_aggregate(store, settings, event).await,
            Err(err) => flat_failure(err, "result aggregation failed"),
        },
    }
}

fn parse<T: DeserializeOwned>(event: Value) -> Result<T, RelayError> {
    serde_json::from_value(event).map_err(|err| RelayError::config(format!("invalid event: {}", err)))
}

pub async fn invoke_move(
    store: &dyn ObjectStore,
    settings: &RelaySettings,
    event: MoveEvent,
) -> InvocationResponse {
    let req = match event.resolve(&settings.defaults) {
        Ok(req) => req,
        Err(err) => return transfer_failure(err),
    };

    match run_move(store, &settings.lister, &req).await {
        Ok(MoveOutcome::NothingToMove) => InvocationResponse::wrapped(
            STATUS_OK,
            &TransferBody {
                message: "no files found".into(),
                files_processed: 0,
                source_bucket: req.source_bucket,
                dest_bucket: req.dest_bucket,
                ..Default::default()
            },
        ),
        Ok(MoveOutcome::Moved(result)) => InvocationResponse::wrapped(
            STATUS_OK,
            &TransferBody {
                message: "processing complete".into(),
                files_processed: result.success_count,
                errors: Some(result.error_count),
                source_bucket: req.source_bucket,
                dest_bucket: req.dest_bucket,
                execution_time_seconds: Some(result.elapsed_seconds),
                ..Default::default()
            },
        ),
        Err(err) => transfer_failure(err),
    }
}

pub async fn invoke_merge(
    store: &dyn ObjectStore,
    settings: &RelaySettings,
    event: MergeEvent,
) -> InvocationResponse {
    let req = match event.resolve(&settings.defaults) {
        Ok(req) => req,
        Err(err) => return transfer_failure(err),
    };

    match run_merge(store, &settings.lister, &req).await {
        Ok(MergeRun::NothingToMerge) => InvocationResponse::wrapped(
            STATUS_OK,
            &TransferBody {
                message: "no files found".into(),
                files_processed: 0,
                source_bucket: req.transfer.source_bucket,
                dest_bucket: req.transfer.dest_bucket,
                ..Default::default()
            },
        ),
        Ok(MergeRun::Merged(outcome)) => InvocationResponse::wrapped(
            STATUS_OK,
            &TransferBody {
                message: "CSV merge complete".into(),
                files_processed: outcome.files_processed,
                output_file: Some(outcome.output_file),
                source_bucket: req.transfer.source_bucket,
                dest_bucket: req.transfer.dest_bucket,
                execution_time_seconds: Some(outcome.elapsed_seconds),
                total_rows: Some(outcome.total_rows),
                ..Default::default()
            },
        ),
        Err(err) => transfer_failure(err),
    }
}

pub fn invoke_plan(settings: &RelaySettings, event: PlanEvent) -> InvocationResponse {
    let planned = event.resolve(&settings.defaults).and_then(|req| {
        let descriptors = plan(req.total_files, req.files_per_batch)?;
        Ok((req, descriptors))
    });

    match planned {
        Ok((req, descriptors)) => {
            info!(
                total_files = req.total_files,
                batches = descriptors.len(),
                "batches planned"
            );
            let batches: Vec<PlannedBatch> = descriptors
                .into_iter()
                .map(|descriptor| PlannedBatch {
                    descriptor,
                    source_bucket: req.source_bucket.clone(),
                    source_prefix: req.source_prefix.clone(),
                })
                .collect();
            InvocationResponse::flat(
                STATUS_OK,
                &PlanBody {
                    total_batches: batches.len(),
                    batches,
                    total_files: req.total_files,
                    files_per_batch: req.files_per_batch,
                },
            )
        }
        Err(err) => flat_failure(err, "batch planning failed"),
    }
}

pub async fn invoke_aggregate(
    store: &dyn ObjectStore,
    settings: &RelaySettings,
    event: AggregateEvent,
) -> InvocationResponse {
    let req = match event.resolve(&settings.defaults) {
        Ok(req) => req,
        Err(err) => return flat_failure(err, "result aggregation failed"),
    };

    let (summary, report_location) = run_aggregate(store, &req).await;
    InvocationResponse::flat(
        STATUS_OK,
        &AggregateBody {
            summary,
            report_location,
        },
    )
}

fn transfer_failure(err: RelayError) -> InvocationResponse {
    error!(error = %err, "invocation failed");
    InvocationResponse::wrapped(
        STATUS_FAILED,
        &FailureBody {
            error: err.to_string(),
            message: "execution failed".into(),
        },
    )
}

fn flat_failure(err: RelayError, message: &str) -> InvocationResponse {
    error!(error = %err, "invocation failed");
    InvocationResponse::flat(
        STATUS_FAILED,
        &FailureBody {
            error: err.to_string(),
            message: message.into(),
        },
    )
}
