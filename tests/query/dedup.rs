use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::json;

use portal_core::{
    query::{QueryKey, QueryOptions, QueryStatus},
    query_key,
};

use crate::{client, counting_fetcher};

#[tokio::test(start_paused = true)]
async fn given_two_concurrent_subscribers_when_fetch_pending_then_one_network_call_is_shared() {
    let queries = client();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = query_key!["/api/forum/categories", "wellness"];

    let mut first = queries.subscribe(
        key.clone(),
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(50)),
        QueryOptions::default(),
    );
    let mut second = queries.subscribe(
        key.clone(),
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(50)),
        QueryOptions::default(),
    );

    assert_eq!(first.state().status, QueryStatus::Loading);
    assert!(second.state().is_fetching);

    let first_state = first.settled().await;
    let second_state = second.settled().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first_state.status, QueryStatus::Success);
    assert_eq!(first_state.data.as_deref(), Some(&json!({"call": 1})));
    assert_eq!(second_state.data, first_state.data);
}

#[tokio::test(start_paused = true)]
async fn given_reordered_filter_object_when_subscribing_then_the_same_entry_is_used() {
    let queries = client();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut first = queries.subscribe(
        query_key!["/api/appointments", {"status": "upcoming", "page": 1}],
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(20)),
        QueryOptions::default(),
    );
    let mut second = queries.subscribe(
        query_key!["/api/appointments", {"page": 1, "status": "upcoming"}],
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(20)),
        QueryOptions::default(),
    );

    first.settled().await;
    second.settled().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(queries.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn given_fresh_data_when_subscribing_within_stale_time_then_cache_is_served_without_fetch() {
    let queries = client();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::new("/api/medications");
    let options = QueryOptions::default().stale_time(Duration::from_secs(60));

    let first = queries
        .fetch(
            key.clone(),
            counting_fetcher(Arc::clone(&calls), Duration::from_millis(10)),
            options,
        )
        .await
        .expect("first fetch should succeed");

    let subscription = queries.subscribe(
        key.clone(),
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(10)),
        options,
    );
    let state = subscription.state();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.status, QueryStatus::Success);
    assert!(!state.is_fetching);
    assert_eq!(state.data, Some(first));
}

#[tokio::test(start_paused = true)]
async fn given_stale_data_when_subscribing_then_stale_data_is_served_while_revalidating() {
    let queries = client();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::new("/api/rewards/points");
    let options = QueryOptions::default().stale_time(Duration::from_secs(1));

    queries
        .fetch(
            key.clone(),
            counting_fetcher(Arc::clone(&calls), Duration::from_millis(10)),
            options,
        )
        .await
        .expect("first fetch should succeed");
    tokio::time::advance(Duration::from_secs(2)).await;

    let mut subscription = queries.subscribe(
        key.clone(),
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(10)),
        options,
    );
    let during = subscription.state();
    assert_eq!(during.status, QueryStatus::Success);
    assert!(during.is_fetching);
    assert_eq!(during.data.as_deref(), Some(&json!({"call": 1})));

    let after = subscription.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(after.data.as_deref(), Some(&json!({"call": 2})));
}

#[tokio::test(start_paused = true)]
async fn given_disabled_subscription_when_subscribing_then_no_fetch_but_cache_is_readable() {
    let queries = client();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = query_key!["/api/forum/posts", 7];

    let subscription = queries.subscribe(
        key.clone(),
        counting_fetcher(Arc::clone(&calls), Duration::from_millis(10)),
        QueryOptions::default().enabled(false),
    );
    assert_eq!(subscription.state().status, QueryStatus::Idle);

    queries.set_query_data(key.clone(), json!({"id": 7, "title": "Sleep hygiene"}));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let post: Option<serde_json::Value> = subscription.data_as().expect("payload should parse");
    assert_eq!(post, Some(json!({"id": 7, "title": "Sleep hygiene"})));
}
