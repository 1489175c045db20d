use std::{future::Future, sync::Arc};

use serde_json::Value;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::ApiError,
    query::{
        client::QueryClient,
        key::QueryKey,
        state::{MutationState, MutationStatus},
    },
};

/// Tracks one non-idempotent call. Status lives apart from cached reads.
#[derive(Clone)]
pub struct Mutation {
    client: QueryClient,
    state_tx: Arc<watch::Sender<MutationState>>,
}

impl Mutation {
    pub(crate) fn new(client: QueryClient) -> Self {
        let (state_tx, _) = watch::channel(MutationState::idle());
        Self {
            client,
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn state(&self) -> MutationState {
        self.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.state_tx.subscribe()
    }

    pub fn reset(&self) {
        self.state_tx.send_replace(MutationState::idle());
    }

    pub async fn mutate<F>(&self, call: F) -> Result<Arc<Value>, ApiError>
    where
        F: Future<Output = Result<Value, ApiError>>,
    {
        self.state_tx.send_modify(|state| {
            state.status = MutationStatus::Pending;
            state.error = None;
        });
        let mut pending = PendingGuard {
            state_tx: &self.state_tx,
            armed: true,
        };

        let outcome = call.await;
        pending.armed = false;
        match outcome {
            Ok(value) => {
                let data = Arc::new(value);
                let published = Arc::clone(&data);
                self.state_tx.send_modify(|state| {
                    state.status = MutationStatus::Success;
                    state.data = Some(published);
                    state.error = None;
                });
                Ok(data)
            }
            Err(error) => {
                tracing::debug!(target: "query", error = %error, "mutation_failed");
                let published = error.clone();
                self.state_tx.send_modify(|state| {
                    state.status = MutationStatus::Error;
                    state.error = Some(published);
                });
                Err(error)
            }
        }
    }

    /// Runs `call` and, on success only, invalidates every key under `prefixes`.
    pub async fn mutate_and_invalidate<F>(
        &self,
        call: F,
        prefixes: &[QueryKey],
    ) -> Result<Arc<Value>, ApiError>
    where
        F: Future<Output = Result<Value, ApiError>>,
    {
        let data = self.mutate(call).await?;
        for prefix in prefixes {
            self.client.invalidate(prefix);
        }
        Ok(data)
    }

    /// Fire-and-forget variant; progress is observable through `watch`.
    pub fn spawn<F>(&self, call: F, prefixes: Vec<QueryKey>) -> JoinHandle<Result<Arc<Value>, ApiError>>
    where
        F: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let mutation = self.clone();
        tokio::spawn(async move { mutation.mutate_and_invalidate(call, &prefixes).await })
    }
}

/// Returns a mutation to idle when its `mutate` future is dropped before the
/// call finished.
struct PendingGuard<'a> {
    state_tx: &'a watch::Sender<MutationState>,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.state_tx.send_if_modified(|state| {
            if state.status != MutationStatus::Pending {
                return false;
            }
            state.status = MutationStatus::Idle;
            true
        });
        tracing::debug!(target: "query", "mutation_abandoned");
    }
}
