//! Descriptors and their translation into cache option records.
//!
//! A descriptor is pure data: a key, a function that produces a fresh
//! effect, and per-query configuration. Translating one binds it to a
//! runtime and yields the promise-shaped record the cache layer drives.
//! Descriptors are cheap to clone and safe to re-create every render pass -
//! translation captures no per-call state.

use std::sync::Arc;

use crate::bridge::{run_to_exit, OpKind, RunOptions};
use crate::cache::{FetchContext, MutationOptions, QueryKey, QueryOptions};
use crate::effect::Effect;
use crate::outcome::{Cause, Exit};
use crate::runtime::Runtime;
use crate::schema::{IdentitySchema, Schema};

type EffectFn<A, E, R> = Arc<dyn Fn() -> Effect<A, E, R> + Send + Sync>;
type MutationEffectFn<V, A, E, R> = Arc<dyn Fn(V) -> Effect<A, E, R> + Send + Sync>;

// =============================================================================
// Query Descriptor
// =============================================================================

/// A declarative description of one query: key, effect recipe, storage
/// schema, and abort behavior.
pub struct QueryDescriptor<A, E, R, S = IdentitySchema<A>> {
    key: QueryKey,
    effect_fn: EffectFn<A, E, R>,
    schema: S,
    consume_abort_signal: bool,
}

impl<A, E, R> QueryDescriptor<A, E, R>
where
    A: Clone + Send + Sync + 'static,
{
    /// Describe a query that stores its success value as-is.
    pub fn new<F>(key: QueryKey, effect_fn: F) -> Self
    where
        F: Fn() -> Effect<A, E, R> + Send + Sync + 'static,
    {
        Self {
            key,
            effect_fn: Arc::new(effect_fn),
            schema: IdentitySchema::new(),
            consume_abort_signal: false,
        }
    }
}

impl<A, E, R, S> QueryDescriptor<A, E, R, S> {
    /// Replace the storage schema.
    pub fn with_schema<S2>(self, schema: S2) -> QueryDescriptor<A, E, R, S2>
    where
        S2: Schema<A>,
    {
        QueryDescriptor {
            key: self.key,
            effect_fn: self.effect_fn,
            schema,
            consume_abort_signal: self.consume_abort_signal,
        }
    }

    /// Whether the effect run should honor the cache layer's abort signal.
    ///
    /// Off by default: an un-opted-in effect runs to completion even when
    /// the cache abandons the fetch.
    pub fn consume_abort_signal(mut self, consume: bool) -> Self {
        self.consume_abort_signal = consume;
        self
    }

    /// The descriptor's cache key.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<A, E, R, S: Clone> Clone for QueryDescriptor<A, E, R, S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            effect_fn: self.effect_fn.clone(),
            schema: self.schema.clone(),
            consume_abort_signal: self.consume_abort_signal,
        }
    }
}

impl<A, E, R, S> std::fmt::Debug for QueryDescriptor<A, E, R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("key", &self.key)
            .field("consume_abort_signal", &self.consume_abort_signal)
            .finish_non_exhaustive()
    }
}

/// Bind a query descriptor to a runtime, producing the record the cache
/// layer drives.
///
/// The fetch function builds a fresh effect per fetch, runs it through the
/// bridge under `op`'s span, and encodes the success value into the stored
/// wire shape. The cache's abort signal is forwarded into the run only when
/// the descriptor opted in. `select` decodes storage back to the rich value
/// on every read; a decode failure surfaces as a `Die` cause, never a
/// panic.
pub fn to_query_options<A, E, R, S>(
    descriptor: &QueryDescriptor<A, E, R, S>,
    runtime: &Runtime<R>,
    op: OpKind,
) -> QueryOptions<S::Wire, A, E>
where
    A: Send + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
    S: Schema<A> + Clone + 'static,
{
    let effect_fn = descriptor.effect_fn.clone();
    let encode_schema = descriptor.schema.clone();
    let runtime = runtime.clone();
    let key = descriptor.key.clone();
    let consume_abort_signal = descriptor.consume_abort_signal;

    let fetch = move |ctx: FetchContext| {
        let effect = (effect_fn)();
        let runtime = runtime.clone();
        let schema = encode_schema.clone();
        let key = key.clone();
        async move {
            let signal = consume_abort_signal.then(|| ctx.signal.clone());
            let run = RunOptions { signal, op, key };
            match run_to_exit(&effect, &runtime, run).await {
                Exit::Success(value) => schema.encode(value).map_err(Cause::die),
                Exit::Failure(cause) => Err(cause),
            }
        }
    };

    let decode_schema = descriptor.schema.clone();
    let select =
        move |stored: &S::Wire| decode_schema.decode(stored.clone()).map_err(Cause::die);

    QueryOptions::new(descriptor.key.clone(), fetch, select)
}

// =============================================================================
// Mutation Descriptor
// =============================================================================

/// A declarative description of one mutation: key plus an effect recipe
/// over the mutation's variables.
pub struct MutationDescriptor<V, A, E, R> {
    key: QueryKey,
    effect_fn: MutationEffectFn<V, A, E, R>,
}

impl<V, A, E, R> MutationDescriptor<V, A, E, R> {
    /// Describe a mutation.
    pub fn new<F>(key: QueryKey, effect_fn: F) -> Self
    where
        F: Fn(V) -> Effect<A, E, R> + Send + Sync + 'static,
    {
        Self {
            key,
            effect_fn: Arc::new(effect_fn),
        }
    }

    /// The descriptor's cache key.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<V, A, E, R> Clone for MutationDescriptor<V, A, E, R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            effect_fn: self.effect_fn.clone(),
        }
    }
}

impl<V, A, E, R> std::fmt::Debug for MutationDescriptor<V, A, E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Bind a mutation descriptor to a runtime.
///
/// Mutations never receive the cache's abort signal; a started mutation
/// runs to completion. The stored and read shapes are the same - mutations
/// do not go through a schema.
pub fn to_mutation_options<V, A, E, R>(
    descriptor: &MutationDescriptor<V, A, E, R>,
    runtime: &Runtime<R>,
) -> MutationOptions<V, A, E>
where
    V: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    let effect_fn = descriptor.effect_fn.clone();
    let runtime = runtime.clone();
    let key = descriptor.key.clone();

    let mutate = move |vars: V| {
        let effect = (effect_fn)(vars);
        let runtime = runtime.clone();
        let key = key.clone();
        async move {
            let run = RunOptions {
                signal: None,
                op: OpKind::Mutation,
                key,
            };
            run_to_exit(&effect, &runtime, run).await.into_result()
        }
    };

    MutationOptions::new(descriptor.key.clone(), mutate)
}
