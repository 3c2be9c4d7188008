//! Copy-verify-delete moves and resilient reads.

use crate::common::ScriptedStore;
use object_relay::services::transfer::TransferWorker;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn move_copies_verifies_then_deletes() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);
    store.insert("source", "in/a.json", r#"{"id":1}"#);

    let moved = TransferWorker::new(&store)
        .move_object("source", "in/a.json", "dest", "archive/a.json")
        .await;

    assert!(moved);
    assert!(!store.contains("source", "in/a.json"));
    assert_eq!(store.body("dest", "archive/a.json").as_deref(), Some(r#"{"id":1}"#));
    assert_eq!(ScriptedStore::count(&store.head_calls), 1);
    assert_eq!(ScriptedStore::count(&store.delete_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn unverified_copy_never_deletes_the_source() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);
    store.insert("source", "in/a.json", "{}");
    store.fail_head.store(true, Ordering::SeqCst);

    let started = Instant::now();
    let moved = TransferWorker::new(&store)
        .move_object("source", "in/a.json", "dest", "in/a.json")
        .await;
    let elapsed = started.elapsed();

    assert!(!moved);
    assert!(store.contains("source", "in/a.json"));
    assert_eq!(ScriptedStore::count(&store.copy_calls), 2);
    assert_eq!(ScriptedStore::count(&store.delete_calls), 0);
    // One linear backoff step between the two attempts, none after the last.
    assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(510), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn moving_an_object_onto_itself_is_refused() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert("source", "in/a.json", r#"{"id":1}"#);

    let moved = TransferWorker::new(&store)
        .move_object("source", "in/a.json", "source", "in/a.json")
        .await;

    assert!(!moved);
    assert_eq!(store.body("source", "in/a.json").as_deref(), Some(r#"{"id":1}"#));
    assert_eq!(ScriptedStore::count(&store.copy_calls), 0);
    assert_eq!(ScriptedStore::count(&store.delete_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_source_is_not_retried() {
    let store = ScriptedStore::with_buckets(&["source", "dest"]);

    let moved = TransferWorker::new(&store)
        .move_object("source", "gone.json", "dest", "gone.json")
        .await;

    assert!(!moved);
    assert_eq!(ScriptedStore::count(&store.copy_calls), 1);
    assert_eq!(ScriptedStore::count(&store.head_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn read_text_gives_up_on_missing_objects() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert("source", "a.csv", "id\n1\n");
    let worker = TransferWorker::new(&store);

    assert_eq!(worker.read_text("source", "a.csv").await.as_deref(), Some("id\n1\n"));
    assert_eq!(worker.read_text("source", "b.csv").await, None);
    assert_eq!(ScriptedStore::count(&store.get_calls), 2);
}
