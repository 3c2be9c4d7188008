//! Raw invocation events as delivered by the scheduler, and their resolution
//! into validated work descriptions.
//!
//! Every field is optional on the wire. Bucket and prefix fields fall back to
//! the process-level [`EventDefaults`]; an empty string counts as absent.

use crate::errors::RelayError;
use crate::models::batch::{MergeRequest, TransferRequest};
use chrono::Utc;
use serde::Deserialize;

pub const DEFAULT_MAX_FILES_PER_EXECUTION: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TOTAL_FILES: usize = 300_000;
pub const DEFAULT_FILES_PER_BATCH: usize = 1000;

/// Environment-provided fallbacks for bucket and prefix fields.
#[derive(Debug, Clone, Default)]
pub struct EventDefaults {
    pub source_bucket: Option<String>,
    pub dest_bucket: Option<String>,
    pub source_prefix: Option<String>,
    pub dest_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoveEvent {
    pub source_bucket: Option<String>,
    pub dest_bucket: Option<String>,
    pub source_prefix: Option<String>,
    pub dest_prefix: Option<String>,
    pub max_files_per_execution: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeEvent {
    #[serde(flatten)]
    pub transfer: MoveEvent,
    pub output_filename: Option<String>,
    /// Set when the event was produced from a planner descriptor.
    pub batch_start_index: Option<usize>,
    pub batch_end_index: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanEvent {
    pub source_bucket: Option<String>,
    pub source_prefix: Option<String>,
    pub total_files: Option<usize>,
    pub files_per_batch: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregateEvent {
    #[serde(default)]
    pub parallel_results: Vec<serde_json::Value>,
    pub dest_bucket: Option<String>,
    pub dest_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub source_bucket: String,
    pub source_prefix: String,
    pub total_files: usize,
    pub files_per_batch: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRequest {
    pub parallel_results: Vec<serde_json::Value>,
    pub dest_bucket: String,
    pub dest_prefix: String,
}

fn pick(value: Option<String>, fallback: &Option<String>) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.clone().filter(|v| !v.is_empty()))
}

fn positive(value: Option<usize>, default: usize, field: &str) -> Result<usize, RelayError> {
    match value.unwrap_or(default) {
        0 => Err(RelayError::config(format!("{} must be greater than zero", field))),
        n => Ok(n),
    }
}

impl MoveEvent {
    pub fn resolve(self, defaults: &EventDefaults) -> Result<TransferRequest, RelayError> {
        let source_bucket = pick(self.source_bucket, &defaults.source_bucket);
        let dest_bucket = pick(self.dest_bucket, &defaults.dest_bucket);
        let (Some(source_bucket), Some(dest_bucket)) = (source_bucket, dest_bucket) else {
            return Err(RelayError::config(
                "source_bucket and dest_bucket are required",
            ));
        };

        Ok(TransferRequest {
            source_bucket,
            dest_bucket,
            source_prefix: pick(self.source_prefix, &defaults.source_prefix).unwrap_or_default(),
            dest_prefix: pick(self.dest_prefix, &defaults.dest_prefix).unwrap_or_default(),
            max_objects: positive(
                self.max_files_per_execution,
                DEFAULT_MAX_FILES_PER_EXECUTION,
                "max_files_per_execution",
            )?,
            batch_size: positive(self.batch_size, DEFAULT_BATCH_SIZE, "batch_size")?,
        })
    }
}

impl MergeEvent {
    pub fn resolve(self, defaults: &EventDefaults) -> Result<MergeRequest, RelayError> {
        let mut transfer = self.transfer.resolve(defaults)?;

        let range = match (self.batch_start_index, self.batch_end_index) {
            (None, None) => None,
            (start, end) => {
                let start = start.unwrap_or(0);
                let end = end.unwrap_or(start + transfer.max_objects);
                if end <= start {
                    return Err(RelayError::config(format!(
                        "batch_end_index ({}) must be greater than batch_start_index ({})",
                        end, start
                    )));
                }
                // The slice is taken from a listing that reaches `end`.
                transfer.max_objects = end;
                Some((start, end))
            }
        };

        let output_filename = self
            .output_filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("merged_csv_{}.csv", Utc::now().timestamp()));

        Ok(MergeRequest {
            transfer,
            output_filename,
            range,
        })
    }
}

impl PlanEvent {
    pub fn resolve(self, defaults: &EventDefaults) -> Result<PlanRequest, RelayError> {
        let source_bucket = pick(self.source_bucket, &defaults.source_bucket)
            .ok_or_else(|| RelayError::config("source_bucket is required"))?;

        Ok(PlanRequest {
            source_bucket,
            source_prefix: self.source_prefix.unwrap_or_default(),
            total_files: self.total_files.unwrap_or(DEFAULT_TOTAL_FILES),
            files_per_batch: positive(
                self.files_per_batch,
                DEFAULT_FILES_PER_BATCH,
                "files_per_batch",
            )?,
        })
    }
}

impl AggregateEvent {
    pub fn resolve(self, defaults: &EventDefaults) -> Result<AggregateRequest, RelayError> {
        let dest_bucket = pick(self.dest_bucket, &defaults.dest_bucket)
            .ok_or_else(|| RelayError::config("dest_bucket is required"))?;

        Ok(AggregateRequest {
            parallel_results: self.parallel_results,
            dest_bucket,
            dest_prefix: self.dest_prefix.unwrap_or_default(),
        })
    }
}
