use std::{sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::api::ApiError;

pub type FetchFuture = BoxFuture<'static, Result<Value, ApiError>>;

/// Produces one network fetch for a key. Called again for every refetch.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

fn default_stale_time_ms() -> u64 {
    0
}

fn default_gc_time_ms() -> u64 {
    300_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryConfig {
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
        }
    }
}

impl QueryConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            enabled: true,
        }
    }
}

impl QueryOptions {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// `Loading` is only reported while there is no data yet; a background
/// refetch of cached data keeps `Success` and sets `is_fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<ApiError>,
    pub is_fetching: bool,
    pub is_invalidated: bool,
    pub updated_at: Option<Instant>,
    pub generation: u64,
}

impl QueryState {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_invalidated: false,
            updated_at: None,
            generation: 0,
        }
    }

    pub fn stale_at(&self, stale_time: Duration) -> Option<Instant> {
        self.updated_at.map(|updated_at| updated_at + stale_time)
    }

    pub fn is_stale(&self, stale_time: Duration) -> bool {
        if self.is_invalidated || self.status != QueryStatus::Success {
            return true;
        }
        match self.stale_at(stale_time) {
            Some(stale_at) => Instant::now() >= stale_at,
            None => true,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.is_fetching
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct MutationState {
    pub status: MutationStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<ApiError>,
}

impl MutationState {
    pub fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }
}
