//! `POST /invoke/{kind}`: run one move, merge, plan or aggregate invocation.
//!
//! The HTTP status mirrors the `statusCode` in the payload. Well-formed JSON
//! of the wrong shape is reported as a failure envelope, like any other
//! configuration error.

use crate::{
    models::response::InvocationResponse,
    services::invocation::{InvocationKind, invoke},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;

pub async fn run_invocation(
    State(state): State<AppState>,
    Path(kind): Path<InvocationKind>,
    Json(event): Json<Value>,
) -> InvocationResponse {
    invoke(kind, &state.store, &state.settings, event).await
}
