//! The execution report written once per aggregation run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors kept in a report are capped so a mass failure stays readable.
pub const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AggregateReport {
    pub execution_summary: ExecutionSummary,
    pub processing_stats: ProcessingStats,
    pub output_files: Vec<String>,
    pub errors: Vec<BatchError>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExecutionSummary {
    /// RFC 3339.
    pub timestamp: String,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessingStats {
    pub total_files_processed: u64,
    pub total_data_rows: u64,
    pub average_execution_time_seconds: f64,
    pub total_execution_time_seconds: f64,
}

/// A failed batch as reported by the execution that ran it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BatchError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
}
