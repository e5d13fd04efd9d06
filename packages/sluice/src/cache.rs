//! The contract sluice presents to the consuming cache layer.
//!
//! Sluice does not implement caching policy. It translates effects into the
//! promise-shaped option records defined here, and the cache layer - any
//! implementation of [`QueryCache`] - drives them. The types in this module
//! are the boundary: fetch and mutate functions resolve with `Result` values
//! whose error arm is a full [`Cause`], so the cache records structured
//! failures as its native error state without ever seeing a bare panic.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::outcome::Cause;

// =============================================================================
// Query Key
// =============================================================================

/// An ordered, hashable cache key.
///
/// Displays as its segments joined with `/`, which is also how it appears
/// in tracing spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Build a key from ordered segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The key's segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

// =============================================================================
// Fetch Context
// =============================================================================

/// What the cache layer hands a fetch function when it runs it.
///
/// The signal fires when the cache abandons the fetch (invalidation,
/// unsubscription). Whether the effect honors it is the descriptor's choice.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// The cache's per-fetch abort signal.
    pub signal: CancellationToken,
}

impl FetchContext {
    /// Create a context around an abort signal.
    pub fn new(signal: CancellationToken) -> Self {
        Self { signal }
    }
}

// =============================================================================
// Option Records
// =============================================================================

type FetchFn<Stored, E> =
    Arc<dyn Fn(FetchContext) -> BoxFuture<'static, Result<Stored, Cause<E>>> + Send + Sync>;
type SelectFn<Stored, Out, E> = Arc<dyn Fn(&Stored) -> Result<Out, Cause<E>> + Send + Sync>;
type MutateFn<Vars, Out, E> =
    Arc<dyn Fn(Vars) -> BoxFuture<'static, Result<Out, Cause<E>>> + Send + Sync>;

/// A promise-shaped query record the cache layer can drive natively.
///
/// `fetch` produces the stored shape; `select` re-derives the read shape
/// from storage on every read. Both report failure as a full [`Cause`].
pub struct QueryOptions<Stored, Out, E> {
    /// The cache key for this query.
    pub key: QueryKey,
    fetch: FetchFn<Stored, E>,
    select: SelectFn<Stored, Out, E>,
}

impl<Stored, Out, E> QueryOptions<Stored, Out, E> {
    /// Assemble a query record from its key, fetch, and select.
    pub fn new<F, Fut, S>(key: QueryKey, fetch: F, select: S) -> Self
    where
        F: Fn(FetchContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Stored, Cause<E>>> + Send + 'static,
        S: Fn(&Stored) -> Result<Out, Cause<E>> + Send + Sync + 'static,
    {
        Self {
            key,
            fetch: Arc::new(move |ctx| fetch(ctx).boxed()),
            select: Arc::new(select),
        }
    }

    /// Start one fetch.
    pub fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Stored, Cause<E>>> {
        (self.fetch)(ctx)
    }

    /// Derive the read shape from a stored value.
    pub fn select(&self, stored: &Stored) -> Result<Out, Cause<E>> {
        (self.select)(stored)
    }
}

impl<Stored, Out, E> Clone for QueryOptions<Stored, Out, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: self.fetch.clone(),
            select: self.select.clone(),
        }
    }
}

impl<Stored, Out, E> fmt::Debug for QueryOptions<Stored, Out, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A promise-shaped mutation record.
///
/// Mutations take variables and are never aborted by the cache, so the
/// mutate function receives no fetch context.
pub struct MutationOptions<Vars, Out, E> {
    /// The cache key for this mutation.
    pub key: QueryKey,
    mutate: MutateFn<Vars, Out, E>,
}

impl<Vars, Out, E> MutationOptions<Vars, Out, E> {
    /// Assemble a mutation record from its key and mutate function.
    pub fn new<F, Fut>(key: QueryKey, mutate: F) -> Self
    where
        F: Fn(Vars) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Out, Cause<E>>> + Send + 'static,
    {
        Self {
            key,
            mutate: Arc::new(move |vars| mutate(vars).boxed()),
        }
    }

    /// Start one mutation with the given variables.
    pub fn mutate(&self, vars: Vars) -> BoxFuture<'static, Result<Out, Cause<E>>> {
        (self.mutate)(vars)
    }
}

impl<Vars, Out, E> Clone for MutationOptions<Vars, Out, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            mutate: self.mutate.clone(),
        }
    }
}

impl<Vars, Out, E> fmt::Debug for MutationOptions<Vars, Out, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Query State & Suspense Signal
// =============================================================================

/// The cache layer's terminal state for a query read.
///
/// The error arm carries the full cause so consumers can branch on
/// expected failure vs defect vs interruption.
#[derive(Debug, Clone)]
pub enum QueryState<Out, E> {
    /// The query resolved with a value.
    Success(Out),
    /// The query failed; the cause says how.
    Error(Cause<E>),
}

impl<Out, E> QueryState<Out, E> {
    /// The success value, if any.
    pub fn success(&self) -> Option<&Out> {
        match self {
            QueryState::Success(out) => Some(out),
            QueryState::Error(_) => None,
        }
    }

    /// The failure cause, if any.
    pub fn error(&self) -> Option<&Cause<E>> {
        match self {
            QueryState::Success(_) => None,
            QueryState::Error(cause) => Some(cause),
        }
    }
}

/// A cloneable handle that completes when an in-flight fetch settles.
///
/// This is the pending-promise half of the suspense handshake: the caller's
/// scheduler awaits it, then retries the read.
#[derive(Clone)]
pub struct PendingFetch {
    done: Shared<BoxFuture<'static, ()>>,
}

impl PendingFetch {
    /// Wrap a completion future.
    pub fn new<F>(done: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            done: done.boxed().shared(),
        }
    }

    /// Wait for the underlying fetch to settle (successfully or not).
    pub async fn wait(&self) {
        self.done.clone().await;
    }
}

impl fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFetch").finish_non_exhaustive()
    }
}

/// Why a suspense read did not produce a value.
#[derive(Debug)]
pub enum SuspenseSignal<E> {
    /// The fetch is in flight; await the handle and retry the read.
    Pending(PendingFetch),
    /// The fetch settled as a failure.
    Failure(Cause<E>),
}

// =============================================================================
// Cache Contract
// =============================================================================

/// The contract a consuming cache layer implements.
///
/// Sluice hands implementations the option records above and lets them own
/// all caching policy: staleness, deduplication, retries, and storage are
/// out of scope here.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Drive a query to a terminal state, fetching if nothing is stored.
    async fn fetch_query<Stored, Out, E>(
        &self,
        options: QueryOptions<Stored, Out, E>,
    ) -> QueryState<Out, E>
    where
        Stored: Clone + Send + Sync + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static;

    /// Read a query in suspense style: a value if one is stored, otherwise
    /// a [`SuspenseSignal`] describing why not.
    async fn read_suspense<Stored, Out, E>(
        &self,
        options: QueryOptions<Stored, Out, E>,
    ) -> Result<Out, SuspenseSignal<E>>
    where
        Stored: Clone + Send + Sync + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static;

    /// Run a mutation with the given variables.
    async fn run_mutation<Vars, Out, E>(
        &self,
        options: MutationOptions<Vars, Out, E>,
        vars: Vars,
    ) -> Result<Out, Cause<E>>
    where
        Vars: Send + 'static,
        Out: Send + 'static,
        E: Clone + Send + Sync + 'static;
}
