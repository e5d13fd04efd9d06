//! Test drivers for the cache contract.
//!
//! [`MemoryCache`] is the minimal [`QueryCache`] implementation used to
//! exercise the adapter end to end. It is deliberately not a cache policy:
//! no staleness, no retries, no request deduplication - just settled
//! entries per key, in-flight tracking with an abort token, and the
//! suspense handshake.
//!
//! Enable with the `testing` feature to use it from another crate's tests.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    FetchContext, MutationOptions, PendingFetch, QueryCache, QueryKey, QueryOptions, QueryState,
    SuspenseSignal,
};
use crate::outcome::Cause;

struct Inner {
    // Each entry holds a Result<Stored, Cause<E>> behind Any; the generic
    // accessors below downcast it back.
    entries: DashMap<QueryKey, Arc<dyn Any + Send + Sync>>,
    inflight: DashMap<QueryKey, CancellationToken>,
}

/// An in-memory query cache driver.
///
/// Cheap to clone; clones share storage, like handles to one cache.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                inflight: DashMap::new(),
            }),
        }
    }

    /// Fire the abort signal of the in-flight fetch under `key`, if any.
    pub fn cancel_inflight(&self, key: &QueryKey) {
        if let Some(token) = self.inner.inflight.get(key) {
            token.cancel();
        }
    }

    /// Drop the settled entry under `key` and abort any in-flight fetch.
    pub fn invalidate(&self, key: &QueryKey) {
        self.inner.entries.remove(key);
        self.cancel_inflight(key);
    }

    /// Whether a settled entry exists under `key`.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Whether a fetch is currently in flight under `key`.
    pub fn has_inflight(&self, key: &QueryKey) -> bool {
        self.inner.inflight.contains_key(key)
    }

    fn settled<Stored, E>(&self, key: &QueryKey) -> Option<Result<Stored, Cause<E>>>
    where
        Stored: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let entry = self.inner.entries.get(key)?;
        let typed = entry
            .value()
            .clone()
            .downcast::<Result<Stored, Cause<E>>>()
            .ok()?;
        Some((*typed).clone())
    }

    fn settle<Stored, E>(&self, key: &QueryKey, result: &Result<Stored, Cause<E>>)
    where
        Stored: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        // An interrupted fetch is not a reportable state; nothing is stored
        // and the next read fetches again.
        if matches!(result, Err(Cause::Interrupt)) {
            return;
        }
        self.inner
            .entries
            .insert(key.clone(), Arc::new(result.clone()));
    }

    fn read_settled<Stored, Out, E>(
        options: &QueryOptions<Stored, Out, E>,
        settled: Result<Stored, Cause<E>>,
    ) -> QueryState<Out, E> {
        match settled {
            Ok(stored) => match options.select(&stored) {
                Ok(out) => QueryState::Success(out),
                Err(cause) => QueryState::Error(cause),
            },
            Err(cause) => QueryState::Error(cause),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entries.len())
            .field("inflight", &self.inner.inflight.len())
            .finish()
    }
}

#[async_trait]
impl QueryCache for MemoryCache {
    async fn fetch_query<Stored, Out, E>(
        &self,
        options: QueryOptions<Stored, Out, E>,
    ) -> QueryState<Out, E>
    where
        Stored: Clone + Send + Sync + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        if let Some(settled) = self.settled::<Stored, E>(&options.key) {
            return Self::read_settled(&options, settled);
        }

        let token = CancellationToken::new();
        self.inner
            .inflight
            .insert(options.key.clone(), token.clone());
        let result = options.fetch(FetchContext::new(token)).await;
        self.inner.inflight.remove(&options.key);
        self.settle(&options.key, &result);

        Self::read_settled(&options, result)
    }

    async fn read_suspense<Stored, Out, E>(
        &self,
        options: QueryOptions<Stored, Out, E>,
    ) -> Result<Out, SuspenseSignal<E>>
    where
        Stored: Clone + Send + Sync + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        if let Some(settled) = self.settled::<Stored, E>(&options.key) {
            return match settled {
                Ok(stored) => options.select(&stored).map_err(SuspenseSignal::Failure),
                Err(cause) => Err(SuspenseSignal::Failure(cause)),
            };
        }

        let token = CancellationToken::new();
        self.inner
            .inflight
            .insert(options.key.clone(), token.clone());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cache = self.clone();
        let background = options.clone();
        tokio::spawn(async move {
            let result = background.fetch(FetchContext::new(token)).await;
            cache.inner.inflight.remove(&background.key);
            cache.settle(&background.key, &result);
            let _ = tx.send(());
        });

        Err(SuspenseSignal::Pending(PendingFetch::new(async move {
            let _ = rx.await;
        })))
    }

    async fn run_mutation<Vars, Out, E>(
        &self,
        options: MutationOptions<Vars, Out, E>,
        vars: Vars,
    ) -> Result<Out, Cause<E>>
    where
        Vars: Send + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        options.mutate(vars).await
    }
}
