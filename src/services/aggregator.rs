//! Folds the results of parallel merge executions into one report.
//!
//! Results arrive as opaque JSON, either as a merge response wrapped by the
//! scheduler (`{"Payload": {"statusCode", "body"}}`), as a bare merge response
//! (`{"statusCode", "body"}`), or as a scheduler-level failure
//! (`{"error", "batch_info"}`). The `body` may be an object or a JSON-encoded
//! string.

use crate::models::batch::round_secs;
use crate::models::report::{
    AggregateReport, BatchError, ExecutionSummary, MAX_REPORTED_ERRORS, ProcessingStats,
};
use crate::models::request::AggregateRequest;
use crate::services::store::ObjectStore;
use crate::services::transfer::join_key;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

pub const REPORT_CONTENT_TYPE: &str = "application/json";

/// Statistics reported by one successful batch execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub files_processed: u64,
    pub total_rows: u64,
    pub execution_time_seconds: f64,
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Success(BatchStats),
    Failure(BatchError),
    /// Neither a response nor an error; counted in the total only.
    Unrecognized,
}

/// Decide what one parallel result says about its batch.
pub fn classify(result: &Value) -> Classified {
    let response = result.get("Payload").unwrap_or(result);

    if let (Some(status), Some(body)) = (response.get("statusCode"), response.get("body")) {
        let body = match body {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    return Classified::Failure(BatchError {
                        error: format!("unparseable result body: {}", err),
                        message: None,
                        batch_info: None,
                        raw_result: Some(result.to_string()),
                    });
                }
            },
            other => other.clone(),
        };

        if status.as_u64() == Some(200) {
            return Classified::Success(BatchStats {
                files_processed: body.get("files_processed").and_then(Value::as_u64).unwrap_or(0),
                total_rows: body.get("total_rows").and_then(Value::as_u64).unwrap_or(0),
                execution_time_seconds: body
                    .get("execution_time_seconds")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                output_file: body
                    .get("output_file")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }

        return Classified::Failure(BatchError {
            error: body
                .get("error")
                .map(value_text)
                .unwrap_or_else(|| "unknown error".to_string()),
            message: Some(body.get("message").map(value_text).unwrap_or_default()),
            batch_info: None,
            raw_result: None,
        });
    }

    if let Some(err) = result.get("error") {
        return Classified::Failure(BatchError {
            error: value_text(err),
            message: None,
            batch_info: Some(result.get("batch_info").cloned().unwrap_or(Value::Object(Default::default()))),
            raw_result: None,
        });
    }

    Classified::Unrecognized
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compute the report for `results`. Pure; see [`run_aggregate`] for the
/// persisted variant.
pub fn summarize(results: &[Value]) -> AggregateReport {
    let mut successful_batches = 0usize;
    let mut failed_batches = 0usize;
    let mut total_files_processed = 0u64;
    let mut total_data_rows = 0u64;
    let mut execution_times = Vec::new();
    let mut output_files = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match classify(result) {
            Classified::Success(stats) => {
                successful_batches += 1;
                total_files_processed += stats.files_processed;
                total_data_rows += stats.total_rows;
                execution_times.push(stats.execution_time_seconds);
                output_files.extend(stats.output_file);
            }
            Classified::Failure(err) => {
                failed_batches += 1;
                errors.push(err);
            }
            Classified::Unrecognized => warn!("ignoring unrecognized parallel result"),
        }
    }

    let total_batches = results.len();
    let success_rate = if total_batches == 0 {
        0.0
    } else {
        successful_batches as f64 / total_batches as f64 * 100.0
    };
    let total_time: f64 = execution_times.iter().sum();
    let average_time = if execution_times.is_empty() {
        0.0
    } else {
        total_time / execution_times.len() as f64
    };
    errors.truncate(MAX_REPORTED_ERRORS);

    AggregateReport {
        execution_summary: ExecutionSummary {
            timestamp: Utc::now().to_rfc3339(),
            total_batches,
            successful_batches,
            failed_batches,
            success_rate,
        },
        processing_stats: ProcessingStats {
            total_files_processed,
            total_data_rows,
            average_execution_time_seconds: round_secs(average_time),
            total_execution_time_seconds: round_secs(total_time),
        },
        output_files,
        errors,
    }
}

/// Summarize and persist the report. Persisting is best effort: a failed
/// write is logged and the computed report is still returned.
pub async fn run_aggregate(
    store: &dyn ObjectStore,
    req: &AggregateRequest,
) -> (AggregateReport, String) {
    info!(results = req.parallel_results.len(), "aggregating parallel results");
    let report = summarize(&req.parallel_results);

    let report_key = join_key(
        &req.dest_prefix,
        &format!("execution_report_{}.json", Utc::now().timestamp()),
    );
    let location = store.location(&req.dest_bucket, &report_key);

    match serde_json::to_vec_pretty(&report) {
        Ok(body) => {
            match store
                .put_object(&req.dest_bucket, &report_key, REPORT_CONTENT_TYPE, Bytes::from(body))
                .await
            {
                Ok(()) => info!(report = %location, "execution report saved"),
                Err(err) => {
                    error!(report = %location, code = err.code(), error = %err, "saving execution report failed")
                }
            }
        }
        Err(err) => error!(error = %err, "serializing execution report failed"),
    }

    info!(
        successful = report.execution_summary.successful_batches,
        total = report.execution_summary.total_batches,
        "aggregation finished"
    );
    (report, location)
}
