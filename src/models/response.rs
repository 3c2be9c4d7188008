//! Invocation response payloads.
//!
//! Move and merge wrap their payload in `{statusCode, body}`; plan and
//! aggregate put their fields next to `statusCode`. Failures of any kind
//! carry `{error, message}`.

use crate::models::batch::BatchDescriptor;
use crate::models::report::AggregateReport;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;

/// What an invocation returns to its caller, HTTP or CLI alike.
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub payload: Value,
}

impl InvocationResponse {
    fn from_serializable(status_code: u16, payload: &impl Serialize) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            json!({ "statusCode": STATUS_FAILED, "error": err.to_string() })
        });
        Self {
            status_code,
            payload,
        }
    }

    /// `{statusCode, body: {...}}`
    pub fn wrapped(status_code: u16, body: &impl Serialize) -> Self {
        Self::from_serializable(
            status_code,
            &Envelope {
                status_code,
                body,
            },
        )
    }

    /// `{statusCode, ...fields}`
    pub fn flat(status_code: u16, fields: &impl Serialize) -> Self {
        let mut resp = Self::from_serializable(status_code, fields);
        if let Value::Object(map) = &mut resp.payload {
            map.insert("statusCode".into(), json!(status_code));
        }
        resp
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

impl IntoResponse for InvocationResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.payload)).into_response()
    }
}

#[derive(Serialize)]
struct Envelope<'a, B: Serialize> {
    #[serde(rename = "statusCode")]
    status_code: u16,
    body: &'a B,
}

/// Body shared by move and merge responses.
#[derive(Serialize, Debug, Clone, Default)]
pub struct TransferBody {
    pub message: String,
    pub files_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub source_bucket: String,
    pub dest_bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,
}

#[derive(Serialize, Debug, Clone)]
pub struct FailureBody {
    pub error: String,
    pub message: String,
}

/// A planner descriptor plus the source it applies to, ready to be handed
/// to a merge invocation as-is.
#[derive(Serialize, Debug, Clone)]
pub struct PlannedBatch {
    #[serde(flatten)]
    pub descriptor: BatchDescriptor,
    pub source_bucket: String,
    pub source_prefix: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct PlanBody {
    pub batches: Vec<PlannedBatch>,
    pub total_batches: usize,
    pub total_files: usize,
    pub files_per_batch: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct AggregateBody {
    pub summary: AggregateReport,
    pub report_location: String,
}
