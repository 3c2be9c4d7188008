//! Resilient listing: strategy fallbacks, retry classification and filters.

use crate::common::ScriptedStore;
use chrono::Duration as ChronoDuration;
use object_relay::services::lister::{KeyFilter, ListerConfig, ListingStrategy, ResilientLister};
use object_relay::services::store::StoreError;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn empty_prefix_runs_every_strategy_then_gives_up() {
    let store = ScriptedStore::with_buckets(&["source"]);
    let config = ListerConfig::default();
    let lister = ResilientLister::new(&store, &config, KeyFilter::Any);

    let started = Instant::now();
    let files = lister.list("source", "incoming/", 100).await.unwrap();
    let elapsed = started.elapsed();

    assert!(files.is_empty());
    // Paginated + manual, paginated + recent window, paginated.
    assert_eq!(ScriptedStore::count(&store.list_calls), 5);
    // Two backoffs: 1s + U(0,1) and 2s + U(0,1).
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn missing_bucket_fails_without_retrying() {
    let store = ScriptedStore::default();
    let config = ListerConfig::default();
    let lister = ResilientLister::new(&store, &config, KeyFilter::Any);

    let started = Instant::now();
    let err = lister.list("nope", "", 10).await.unwrap_err();

    assert!(matches!(err, StoreError::NoSuchBucket(_)));
    assert_eq!(ScriptedStore::count(&store.list_calls), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn access_denied_is_permanent() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.deny_lists.store(true, Ordering::SeqCst);
    let config = ListerConfig::default();

    let err = ResilientLister::new(&store, &config, KeyFilter::Any)
        .list("source", "", 10)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::AccessDenied(_)));
    assert_eq!(ScriptedStore::count(&store.list_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_after_backoff() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert("source", "in/a.json", "{}");
    store.insert("source", "in/b.json", "{}");
    store.throttle_lists.store(1, Ordering::SeqCst);
    let config = ListerConfig::default();

    let started = Instant::now();
    let files = ResilientLister::new(&store, &config, KeyFilter::Any)
        .list("source", "in/", 10)
        .await
        .unwrap();

    let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["in/a.json", "in/b.json"]);
    assert_eq!(ScriptedStore::count(&store.list_calls), 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn paginated_listing_follows_tokens_up_to_the_cap() {
    let store = ScriptedStore::with_buckets(&["source"]);
    for i in 0..1600 {
        store.insert("source", &format!("in/{:05}.csv", i), "h\nr\n");
    }
    let config = ListerConfig::default();

    let files = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .list("source", "in/", 1500)
        .await
        .unwrap();

    assert_eq!(files.len(), 1500);
    assert_eq!(files[0].key, "in/00000.csv");
    assert_eq!(files[1499].key, "in/01499.csv");
    assert_eq!(ScriptedStore::count(&store.list_calls), 2);
}

#[tokio::test]
async fn filters_drop_markers_foreign_prefixes_and_other_extensions() {
    let store = ScriptedStore::with_buckets(&["source"]);
    for key in ["in/", "in/a.csv", "in/b.txt", "in/sub/", "in/sub/c.CSV", "other/d.csv"] {
        store.insert("source", key, "h\nr\n");
    }
    let config = ListerConfig::default();

    let csv = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .list("source", "in/", 100)
        .await
        .unwrap();
    let keys: Vec<_> = csv.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["in/a.csv", "in/sub/c.CSV"]);

    let any = ResilientLister::new(&store, &config, KeyFilter::Any)
        .list("source", "in/", 100)
        .await
        .unwrap();
    let keys: Vec<_> = any.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["in/a.csv", "in/b.txt", "in/sub/c.CSV"]);
}

#[tokio::test]
async fn recent_window_keeps_only_recent_objects() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert_aged("source", "in/old.csv", "h\nr\n", ChronoDuration::hours(48));
    store.insert_aged("source", "in/new.csv", "h\nr\n", ChronoDuration::hours(1));
    store.insert_aged("source", "in/stale.csv", "h\nr\n", ChronoDuration::hours(30));
    let config = ListerConfig::default();

    let files = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .run_strategy(ListingStrategy::RecentWindow, "source", "in/", 10)
        .await
        .unwrap();

    let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["in/new.csv"]);
}

#[tokio::test]
async fn recent_window_length_is_configurable() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert_aged("source", "in/stale.csv", "h\nr\n", ChronoDuration::hours(30));
    let config = ListerConfig::default().with_recent_window_hours(72);

    let files = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .run_strategy(ListingStrategy::RecentWindow, "source", "in/", 10)
        .await
        .unwrap();

    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn oversized_recent_window_keeps_everything() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert_aged("source", "in/ancient.csv", "h\nr\n", ChronoDuration::days(3650));
    store.insert_aged("source", "in/new.csv", "h\nr\n", ChronoDuration::hours(1));
    let config = ListerConfig::default().with_recent_window_hours(3_000_000_000);

    let files = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .run_strategy(ListingStrategy::RecentWindow, "source", "in/", 10)
        .await
        .unwrap();

    let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["in/ancient.csv", "in/new.csv"]);
}

#[tokio::test]
async fn recent_window_swallows_transient_errors() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert("source", "in/a.csv", "h\nr\n");
    store.throttle_lists.store(1, Ordering::SeqCst);
    let config = ListerConfig::default();

    let files = ResilientLister::new(&store, &config, KeyFilter::Csv)
        .run_strategy(ListingStrategy::RecentWindow, "source", "in/", 10)
        .await
        .unwrap();

    assert!(files.is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_pagination_stops_at_the_cap() {
    let store = ScriptedStore::with_buckets(&["source"]);
    for key in ["a.json", "b.json", "c.json"] {
        store.insert("source", key, "{}");
    }
    let config = ListerConfig::default();

    let files = ResilientLister::new(&store, &config, KeyFilter::Any)
        .run_strategy(ListingStrategy::ManualPagination, "source", "", 2)
        .await
        .unwrap();

    let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["a.json", "b.json"]);
    assert_eq!(ScriptedStore::count(&store.list_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_pagination_stops_on_an_empty_page() {
    let store = ScriptedStore::with_buckets(&["source"]);
    store.insert("source", "a.json", "{}");
    store.hide_listing.store(true, Ordering::SeqCst);
    let config = ListerConfig::default();

    let files = ResilientLister::new(&store, &config, KeyFilter::Any)
        .run_strategy(ListingStrategy::ManualPagination, "source", "", 10)
        .await
        .unwrap();

    assert!(files.is_empty());
    assert_eq!(ScriptedStore::count(&store.list_calls), 1);
}
