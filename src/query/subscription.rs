use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{ApiError, error::decode_error},
    query::{
        client::QueryClient,
        key::QueryKey,
        state::{QueryOptions, QueryState},
    },
};

/// One consumer's view of a cached query. Dropping it unsubscribes.
pub struct Subscription {
    client: QueryClient,
    key: QueryKey,
    entry_id: u64,
    receiver: watch::Receiver<QueryState>,
    options: QueryOptions,
    cancellation: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        client: QueryClient,
        key: QueryKey,
        entry_id: u64,
        receiver: watch::Receiver<QueryState>,
        options: QueryOptions,
    ) -> Self {
        Self {
            client,
            key,
            entry_id,
            receiver,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn state(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    /// Waits for the next state transition. `None` once the entry was removed.
    pub async fn changed(&mut self) -> Option<QueryState> {
        match self.receiver.changed().await {
            Ok(()) => Some(self.receiver.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Waits until no fetch is in flight for this key.
    pub async fn settled(&mut self) -> QueryState {
        loop {
            {
                let state = self.receiver.borrow_and_update();
                if state.is_settled() {
                    return state.clone();
                }
            }
            if self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }

    /// Parses the cached payload into `T`; `Ok(None)` when nothing is cached yet.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, ApiError> {
        let Some(data) = self.receiver.borrow().data.clone() else {
            return Ok(None);
        };
        T::deserialize(data.as_ref()).map(Some).map_err(|err| {
            decode_error(format!("cached payload for {} has unexpected shape: {}", self.key, err))
        })
    }

    /// Forces a fetch, sharing the running one if there is any.
    pub fn refetch(&self) {
        self.client.refetch(&self.key, self.entry_id);
    }

    /// Cancelled when this subscription is dropped.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Every state transition from now on, starting with the current one.
    pub fn updates(&self) -> WatchStream<QueryState> {
        WatchStream::new(self.receiver.clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancellation.cancel();
        self.client
            .unsubscribe(&self.key, self.entry_id, self.options.enabled);
    }
}
