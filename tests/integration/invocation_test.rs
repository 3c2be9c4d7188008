//! Response envelopes for every invocation kind.

use crate::common::{ScriptedStore, csv};
use object_relay::models::request::EventDefaults;
use object_relay::services::invocation::{InvocationKind, RelaySettings, invoke};
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

fn settings() -> RelaySettings {
    RelaySettings::default()
}

#[tokio::test]
async fn move_without_buckets_fails_before_any_store_call() {
    let store = ScriptedStore::default();

    let resp = invoke(InvocationKind::Move, &store, &settings(), json!({})).await;

    assert_eq!(resp.status_code, 500);
    assert!(!resp.is_success());
    assert_eq!(resp.payload["statusCode"], 500);
    assert_eq!(
        resp.payload["body"]["error"],
        "source_bucket and dest_bucket are required"
    );
    assert_eq!(resp.payload["body"]["message"], "execution failed");
    assert_eq!(ScriptedStore::count(&store.list_calls), 0);
}

#[tokio::test]
async fn malformed_event_is_a_failure_envelope() {
    let store = ScriptedStore::default();

    let resp = invoke(
        InvocationKind::Move,
        &store,
        &settings(),
        json!({"source_bucket": "source", "dest_bucket": "dest", "batch_size": "ten"}),
    )
    .await;

    assert_eq!(resp.status_code, 500);
    let error = resp.payload["body"]["error"].as_str().unwrap();
    assert!(error.starts_with("invalid event"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn move_reports_counts_in_a_wrapped_body() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);
    store.insert("source", "in/a.json", "{}");
    store.insert("source", "in/b.json", "{}");

    let resp = invoke(
        InvocationKind::Move,
        &store,
        &settings(),
        json!({"source_bucket": "source", "dest_bucket": "dest", "source_prefix": "in/"}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    let body = &resp.payload["body"];
    assert_eq!(body["message"], "processing complete");
    assert_eq!(body["files_processed"], 2);
    assert_eq!(body["errors"], 0);
    assert_eq!(body["source_bucket"], "source");
    assert_eq!(body["dest_bucket"], "dest");
    assert!(body["execution_time_seconds"].is_number());
    assert_eq!(store.keys("dest"), ["a.json", "b.json"]);
}

#[tokio::test(start_paused = true)]
async fn empty_move_says_no_files_found() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);

    let resp = invoke(
        InvocationKind::Move,
        &store,
        &settings(),
        json!({"source_bucket": "source", "dest_bucket": "dest"}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.payload["body"]["message"], "no files found");
    assert_eq!(resp.payload["body"]["files_processed"], 0);
    assert!(resp.payload["body"].get("errors").is_none());
}

#[tokio::test(start_paused = true)]
async fn environment_defaults_fill_missing_buckets() {
    let store = ScriptedStore::with_buckets(&["env-source", "env-dest"]);
    let settings = RelaySettings {
        defaults: EventDefaults {
            source_bucket: Some("env-source".into()),
            dest_bucket: Some("env-dest".into()),
            ..Default::default()
        },
        ..Default::default()
    };

    let resp = invoke(InvocationKind::Move, &store, &settings, json!({})).await;

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.payload["body"]["source_bucket"], "env-source");
}

#[tokio::test(start_paused = true)]
async fn merge_reports_output_and_rows() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);
    store.insert("source", "daily/a.csv", &csv("id", "1"));
    store.insert("source", "daily/b.csv", &csv("id", "2"));

    let resp = invoke(
        InvocationKind::Merge,
        &store,
        &settings(),
        json!({
            "source_bucket": "source",
            "dest_bucket": "dest",
            "source_prefix": "daily/",
            "dest_prefix": "merged/",
            "output_filename": "merged_batch_001.csv",
            "batch_start_index": 0,
            "batch_end_index": 1
        }),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    let body = &resp.payload["body"];
    assert_eq!(body["message"], "CSV merge complete");
    assert_eq!(body["files_processed"], 1);
    assert_eq!(body["total_rows"], 1);
    assert_eq!(body["output_file"], "s3://dest/merged/merged_batch_001.csv");
    assert_eq!(
        store.body("dest", "merged/merged_batch_001.csv").as_deref(),
        Some("id\n1\n")
    );
}

#[tokio::test(start_paused = true)]
async fn merge_write_failure_is_a_500() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);
    store.insert("source", "a.csv", &csv("id", "1"));
    store.fail_put.store(true, Ordering::SeqCst);

    let resp = invoke(
        InvocationKind::Merge,
        &store,
        &settings(),
        json!({"source_bucket": "source", "dest_bucket": "dest"}),
    )
    .await;

    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.payload["body"]["message"], "execution failed");
}

#[tokio::test]
async fn plan_is_flat_and_carries_the_source() {
    let store = ScriptedStore::default();

    let resp = invoke(
        InvocationKind::Plan,
        &store,
        &settings(),
        json!({"source_bucket": "raw", "source_prefix": "daily/", "total_files": 2500, "files_per_batch": 1000}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    let p = &resp.payload;
    assert_eq!(p["statusCode"], 200);
    assert_eq!(p["total_batches"], 3);
    assert_eq!(p["total_files"], 2500);
    assert_eq!(p["files_per_batch"], 1000);
    assert_eq!(
        p["batches"][2],
        json!({
            "batch_number": 3,
            "batch_start_index": 2000,
            "batch_end_index": 2500,
            "output_filename": "merged_batch_003.csv",
            "source_bucket": "raw",
            "source_prefix": "daily/"
        })
    );
    assert_eq!(ScriptedStore::count(&store.list_calls), 0);
}

#[tokio::test]
async fn plan_with_zero_batch_size_fails_flat() {
    let store = ScriptedStore::default();

    let resp = invoke(
        InvocationKind::Plan,
        &store,
        &settings(),
        json!({"source_bucket": "raw", "files_per_batch": 0}),
    )
    .await;

    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.payload["statusCode"], 500);
    assert_eq!(resp.payload["error"], "files_per_batch must be greater than zero");
    assert!(resp.payload.get("body").is_none());
}

#[tokio::test]
async fn plan_of_zero_files_has_no_batches() {
    let store = ScriptedStore::default();

    let resp = invoke(
        InvocationKind::Plan,
        &store,
        &settings(),
        json!({"source_bucket": "raw", "total_files": 0}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.payload["total_batches"], 0);
    assert_eq!(resp.payload["batches"], json!([]));
}

fn parallel_results() -> Value {
    json!([
        {"Payload": {"statusCode": 200, "body": "{\"files_processed\": 3, \"total_rows\": 3, \"execution_time_seconds\": 1.5, \"output_file\": \"s3://dest/merged_batch_001.csv\"}"}},
        {"error": "States.TaskFailed", "batch_info": {"batch_number": 2}}
    ])
}

#[tokio::test]
async fn aggregate_persists_the_report() {
    let store = ScriptedStore::with_buckets(&["reports"]);

    let resp = invoke(
        InvocationKind::Aggregate,
        &store,
        &settings(),
        json!({"parallel_results": parallel_results(), "dest_bucket": "reports", "dest_prefix": "runs"}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    let p = &resp.payload;
    assert_eq!(p["summary"]["execution_summary"]["total_batches"], 2);
    assert_eq!(p["summary"]["execution_summary"]["success_rate"], 50.0);
    assert_eq!(p["summary"]["processing_stats"]["total_files_processed"], 3);
    assert_eq!(p["summary"]["output_files"], json!(["s3://dest/merged_batch_001.csv"]));

    let location = p["report_location"].as_str().unwrap();
    assert!(location.starts_with("s3://reports/runs/execution_report_"));
    let key = location.trim_start_matches("s3://reports/");
    let saved: Value = serde_json::from_str(&store.body("reports", key).unwrap()).unwrap();
    assert_eq!(saved, p["summary"]);
}

#[tokio::test]
async fn aggregate_survives_a_failed_report_write() {
    let store = ScriptedStore::with_buckets(&["reports"]);
    store.fail_put.store(true, Ordering::SeqCst);

    let resp = invoke(
        InvocationKind::Aggregate,
        &store,
        &settings(),
        json!({"parallel_results": parallel_results(), "dest_bucket": "reports"}),
    )
    .await;

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.payload["summary"]["execution_summary"]["failed_batches"], 1);
    assert_eq!(ScriptedStore::count(&store.put_calls), 1);
}

#[tokio::test]
async fn aggregate_without_destination_fails_flat() {
    let store = ScriptedStore::default();

    let resp = invoke(
        InvocationKind::Aggregate,
        &store,
        &settings(),
        json!({"parallel_results": []}),
    )
    .await;

    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.payload["error"], "dest_bucket is required");
    assert_eq!(resp.payload["message"], "result aggregation failed");
}
