use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::watch,
    task::AbortHandle,
    time::{Instant, sleep},
};

use crate::{
    api::{
        ApiError,
        error::{cancelled, internal_error, invalid_request},
    },
    query::{
        key::QueryKey,
        mutation::Mutation,
        state::{Fetcher, QueryConfig, QueryOptions, QueryState, QueryStatus},
        subscription::Subscription,
    },
};

/// Process-wide query cache. Cheap to clone; every clone shares one map.
///
/// Fetches run as tokio tasks, so `subscribe`, `invalidate` and friends must
/// be called from inside a runtime.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<QueryClientInner>,
}

pub(crate) struct QueryClientInner {
    entries: Mutex<HashMap<QueryKey, QueryEntry>>,
    next_entry_id: AtomicU64,
    config: QueryConfig,
}

struct QueryEntry {
    id: u64,
    state_tx: watch::Sender<QueryState>,
    fetcher: Option<Fetcher>,
    subscribers: usize,
    enabled_subscribers: usize,
    generation: u64,
    in_flight: Option<InFlight>,
    idle_since: Option<Instant>,
}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

impl QueryEntry {
    fn new(id: u64) -> Self {
        let (state_tx, _) = watch::channel(QueryState::idle());
        Self {
            id,
            state_tx,
            fetcher: None,
            subscribers: 0,
            enabled_subscribers: 0,
            generation: 0,
            in_flight: None,
            idle_since: Some(Instant::now()),
        }
    }

    fn snapshot(&self) -> QueryState {
        self.state_tx.borrow().clone()
    }

    fn is_expired(&self, now: Instant, gc_time: Duration) -> bool {
        self.subscribers == 0
            && self.in_flight.is_none()
            && self
                .idle_since
                .is_some_and(|idle_since| now.duration_since(idle_since) >= gc_time)
    }
}

impl QueryClient {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(QueryClientInner {
                entries: Mutex::new(HashMap::new()),
                next_entry_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Options carrying the configured default stale time.
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions::default().stale_time(self.inner.config.stale_time())
    }

    /// Registers a subscriber for `key` and returns its handle.
    ///
    /// Fresh cached data is served without a fetch. Stale or missing data
    /// starts a background fetch unless one is already in flight, in which
    /// case the new subscriber shares it.
    pub fn subscribe(
        &self,
        key: QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Subscription {
        let mut entries = self.inner.lock_entries();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| QueryEntry::new(self.inner.allocate_entry_id()));

        entry.subscribers += 1;
        entry.idle_since = None;
        if options.enabled {
            entry.enabled_subscribers += 1;
            entry.fetcher = Some(fetcher);
        } else if entry.fetcher.is_none() {
            entry.fetcher = Some(fetcher);
        }

        let receiver = entry.state_tx.subscribe();
        let entry_id = entry.id;
        let needs_fetch = options.enabled
            && entry.in_flight.is_none()
            && entry.state_tx.borrow().is_stale(options.stale_time);

        tracing::debug!(
            target: "query",
            key = %key,
            subscribers = entry.subscribers,
            enabled = options.enabled,
            needs_fetch = needs_fetch,
            "query_subscribed"
        );

        if needs_fetch {
            start_fetch(&self.inner, &key, entry);
        }
        drop(entries);

        Subscription::new(self.clone(), key, entry_id, receiver, options)
    }

    /// Subscribes, waits for the fetch to settle, and unsubscribes.
    pub async fn fetch(
        &self,
        key: QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Result<Arc<Value>, ApiError> {
        let mut subscription = self.subscribe(key.clone(), fetcher, options);
        let state = subscription.settled().await;
        if state.is_fetching {
            return Err(cancelled(format!("query {} was removed before it settled", key)));
        }
        match (state.status, state.data, state.error) {
            (QueryStatus::Error, _, Some(error)) => Err(error),
            (_, Some(data), _) => Ok(data),
            _ => Err(invalid_request(format!(
                "query {} is disabled and has no cached data",
                key
            ))),
        }
    }

    /// Marks every entry under `prefix` stale and refetches those with
    /// enabled subscribers. Returns the number of matched entries.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.lock_entries();
        let mut matched = 0;
        let mut refetched = 0;

        for (key, entry) in entries.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            matched += 1;
            entry
                .state_tx
                .send_modify(|state| state.is_invalidated = true);
            if entry.enabled_subscribers > 0 && entry.fetcher.is_some() {
                start_fetch(&self.inner, key, entry);
                refetched += 1;
            }
        }

        tracing::debug!(
            target: "query",
            prefix = %prefix,
            matched = matched,
            refetched = refetched,
            "query_invalidated"
        );
        matched
    }

    pub fn get_state(&self, key: &QueryKey) -> Option<QueryState> {
        self.inner
            .lock_entries()
            .get(key)
            .map(QueryEntry::snapshot)
    }

    /// Writes `value` as fresh data for `key`, e.g. after an optimistic update.
    pub fn set_query_data(&self, key: QueryKey, value: Value) {
        let mut entries = self.inner.lock_entries();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| QueryEntry::new(self.inner.allocate_entry_id()));
        if entry.subscribers == 0 {
            entry.idle_since = Some(Instant::now());
            schedule_eviction(&self.inner, &key, entry.id);
        }
        let data = Arc::new(value);
        entry.state_tx.send_modify(|state| {
            state.status = QueryStatus::Success;
            state.data = Some(data);
            state.error = None;
            state.is_invalidated = false;
            state.updated_at = Some(Instant::now());
        });
    }

    /// Drops every entry under `prefix`, aborting any fetch still running.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.lock_entries();
        let before = entries.len();
        entries.retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if let Some(in_flight) = entry.in_flight.take() {
                in_flight.abort.abort();
            }
            false
        });
        before - entries.len()
    }

    /// Evicts entries nobody has subscribed to for at least `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time();
        let now = Instant::now();
        let mut entries = self.inner.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, gc_time));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(target: "query", evicted = evicted, "query_garbage_collected");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.inner.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mutation(&self) -> Mutation {
        Mutation::new(self.clone())
    }

    /// Starts a fetch for a subscribed key unless one is already running.
    pub(crate) fn refetch(&self, key: &QueryKey, entry_id: u64) {
        let mut entries = self.inner.lock_entries();
        if let Some(entry) = entries.get_mut(key) {
            if entry.id == entry_id && entry.in_flight.is_none() && entry.fetcher.is_some() {
                start_fetch(&self.inner, key, entry);
            }
        }
    }

    pub(crate) fn unsubscribe(&self, key: &QueryKey, entry_id: u64, enabled: bool) {
        let gc_time = self.inner.config.gc_time();
        let mut entries = self.inner.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.id != entry_id {
            return;
        }

        entry.subscribers = entry.subscribers.saturating_sub(1);
        if enabled {
            entry.enabled_subscribers = entry.enabled_subscribers.saturating_sub(1);
        }
        tracing::debug!(
            target: "query",
            key = %key,
            subscribers = entry.subscribers,
            "query_unsubscribed"
        );

        if entry.subscribers == 0 {
            entry.idle_since = Some(Instant::now());
            if gc_time.is_zero() {
                if entry.in_flight.is_none() {
                    entries.remove(key);
                }
            } else {
                schedule_eviction(&self.inner, key, entry_id);
            }
        }
    }
}

impl QueryClientInner {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<QueryKey, QueryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_entry_id(&self) -> u64 {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Applies a fetch result if it still belongs to the latest generation.
    fn complete_fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        generation: u64,
        result: Result<Value, ApiError>,
    ) {
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            tracing::debug!(target: "query", key = %key, "query_result_dropped_entry_evicted");
            return;
        };

        if entry.generation != generation {
            tracing::debug!(
                target: "query",
                key = %key,
                generation = generation,
                latest_generation = entry.generation,
                "query_result_discarded_stale_generation"
            );
            return;
        }

        entry.in_flight = None;
        match result {
            Ok(value) => {
                let data = Arc::new(value);
                entry.state_tx.send_modify(|state| {
                    state.status = QueryStatus::Success;
                    state.data = Some(data);
                    state.error = None;
                    state.is_fetching = false;
                    state.is_invalidated = false;
                    state.updated_at = Some(Instant::now());
                });
                tracing::debug!(target: "query", key = %key, generation = generation, "query_fetch_succeeded");
            }
            Err(error) => {
                tracing::debug!(
                    target: "query",
                    key = %key,
                    generation = generation,
                    error = %error,
                    "query_fetch_failed"
                );
                entry.state_tx.send_modify(|state| {
                    state.status = QueryStatus::Error;
                    state.error = Some(error);
                    state.is_fetching = false;
                });
            }
        }

        if entry.subscribers == 0 {
            if self.config.gc_time().is_zero() {
                entries.remove(key);
            } else {
                schedule_eviction(self, key, entry.id);
            }
        }
    }

    /// Removes `key` if it is still the same unsubscribed entry and has sat
    /// idle for the full `gc_time`.
    fn evict_if_expired(&self, key: &QueryKey, entry_id: u64) {
        let gc_time = self.config.gc_time();
        let mut entries = self.lock_entries();
        let expired = entries
            .get(key)
            .is_some_and(|entry| entry.id == entry_id && entry.is_expired(Instant::now(), gc_time));
        if expired {
            entries.remove(key);
            tracing::debug!(target: "query", key = %key, "query_entry_evicted");
        }
    }
}

/// Arms a one-shot timer that evicts `key` after `gc_time` unless it was
/// resubscribed or replaced in the meantime.
fn schedule_eviction(inner: &Arc<QueryClientInner>, key: &QueryKey, entry_id: u64) {
    let gc_time = inner.config.gc_time();
    if gc_time.is_zero() {
        return;
    }
    let Ok(runtime) = Handle::try_current() else {
        tracing::debug!(target: "query", key = %key, "query_eviction_skipped_no_runtime");
        return;
    };
    let weak: Weak<QueryClientInner> = Arc::downgrade(inner);
    let key = key.clone();
    runtime.spawn(async move {
        sleep(gc_time).await;
        if let Some(inner) = weak.upgrade() {
            inner.evict_if_expired(&key, entry_id);
        }
    });
}

/// Issues a new generation for `entry`, superseding any fetch in flight.
fn start_fetch(inner: &Arc<QueryClientInner>, key: &QueryKey, entry: &mut QueryEntry) {
    let Some(fetcher) = entry.fetcher.clone() else {
        return;
    };

    entry.generation += 1;
    let generation = entry.generation;

    if let Some(previous) = entry.in_flight.take() {
        previous.abort.abort();
        tracing::debug!(
            target: "query",
            key = %key,
            superseded_generation = previous.generation,
            generation = generation,
            "query_fetch_superseded"
        );
    }

    entry.state_tx.send_modify(|state| {
        state.is_fetching = true;
        state.generation = generation;
        if state.data.is_none() {
            state.status = QueryStatus::Loading;
        }
    });
    tracing::debug!(target: "query", key = %key, generation = generation, "query_fetch_started");

    let weak: Weak<QueryClientInner> = Arc::downgrade(inner);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
        let result = AssertUnwindSafe(async move { fetcher().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(
                    target: "query",
                    key = %task_key,
                    generation = generation,
                    "query_fetcher_panicked"
                );
                Err(internal_error(format!("fetcher for query {} panicked", task_key)))
            });
        if let Some(inner) = weak.upgrade() {
            inner.complete_fetch(&task_key, generation, result);
        }
    });

    entry.in_flight = Some(InFlight {
        generation,
        abort: handle.abort_handle(),
    });
}
