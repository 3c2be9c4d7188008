//! Resolved work descriptions and the values the orchestrators hand back.

use serde::{Deserialize, Serialize};

/// A fully validated move or merge slice: buckets present, limits positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_bucket: String,
    pub dest_bucket: String,
    pub source_prefix: String,
    pub dest_prefix: String,
    pub max_objects: usize,
    pub batch_size: usize,
}

/// Merge invocations add an output name and, when driven by the planner,
/// the index range of the listing they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub transfer: TransferRequest,
    pub output_filename: String,
    pub range: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionResult {
    pub success_count: usize,
    pub error_count: usize,
    pub elapsed_seconds: f64,
}

impl ExecutionResult {
    pub fn absorb(&mut self, batch: BatchResult) {
        self.success_count += batch.success_count;
        self.error_count += batch.error_count;
    }
}

/// Result of a merge run that found at least one CSV object.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub files_processed: usize,
    pub total_rows: usize,
    pub skipped: usize,
    pub output_file: String,
    pub elapsed_seconds: f64,
}

/// One independently executable merge slice produced by the planner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BatchDescriptor {
    /// 1-based sequence number.
    pub batch_number: usize,
    pub batch_start_index: usize,
    /// Exclusive.
    pub batch_end_index: usize,
    pub output_filename: String,
}

impl BatchDescriptor {
    pub fn len(&self) -> usize {
        self.batch_end_index - self.batch_start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Round wall-clock seconds the way every response reports them.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
