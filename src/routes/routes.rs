//! Route table.
//!
//! - `POST /invoke/{kind}`: move, merge, plan or aggregate
//! - `GET  /healthz`, `GET /readyz`
//! - `PUT  /{bucket}`: create bucket
//! - `PUT  /{bucket}/{*key}`, `GET /{bucket}/{*key}`: upload, download
//!
//! The wildcard `*key` allows nested keys like `incoming/2025/a.csv`.
//! `invoke`, `healthz` and `readyz` are reserved and cannot be bucket names.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        invocation_handlers::run_invocation,
        object_handlers::{create_bucket, get_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/invoke/{kind}", post(run_invocation))
        .route("/{bucket}/{*key}", put(upload_object).get(get_object))
        .route("/{bucket}", put(create_bucket))
}
