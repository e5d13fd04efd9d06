//! Effect values: lazy, typed, cancellable computation descriptions.
//!
//! An [`Effect`] is a value, not a running task. Constructing one performs
//! no work; running it hands the underlying closure an [`EffectContext`]
//! with the resolved capabilities and a cancellation signal, and drives the
//! returned future to a typed `Result`.
//!
//! # Key Properties
//!
//! - **Lazy**: nothing happens until the bridge runs the effect
//! - **Re-entrant safe**: running the same effect value twice produces two
//!   independent executions (no hidden single-use state)
//! - **Typed**: success, error, and capability requirements are all explicit
//!
//! # Example
//!
//! ```ignore
//! let effect: Effect<Vec<Item>, ApiError, ItemClient> =
//!     Effect::new(|ctx| async move { ctx.caps().list_items().await });
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// Context handed to an effect when it runs.
///
/// # Immutability Invariant
///
/// `EffectContext` is **immutable and cheap to clone**; clones are
/// semantically identical. It exposes exactly two things: the shared
/// capability set and the run's cancellation signal. Effects that want to
/// interrupt cooperatively at finer granularity than the bridge's own
/// cancellation check should poll `signal()`.
pub struct EffectContext<R> {
    caps: Arc<R>,
    signal: CancellationToken,
}

impl<R> EffectContext<R> {
    /// Create a context from a capability set and a cancellation signal.
    pub fn new(caps: Arc<R>, signal: CancellationToken) -> Self {
        Self { caps, signal }
    }

    /// Get the resolved capability set.
    pub fn caps(&self) -> &R {
        &self.caps
    }

    /// Get the cancellation signal for this run.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }
}

impl<R> Clone for EffectContext<R> {
    fn clone(&self) -> Self {
        Self {
            caps: self.caps.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<R> std::fmt::Debug for EffectContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectContext").finish_non_exhaustive()
    }
}

type RunFn<A, E, R> =
    Arc<dyn Fn(EffectContext<R>) -> BoxFuture<'static, Result<A, E>> + Send + Sync>;

/// A lazy, re-usable description of a cancellable computation with declared
/// success, error, and capability types.
pub struct Effect<A, E, R> {
    run: RunFn<A, E, R>,
}

impl<A, E, R> Effect<A, E, R>
where
    A: Send + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    /// Create an effect from an async closure over the context.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EffectContext<R>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<A, E>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    /// An effect that succeeds with a fixed value.
    pub fn succeed(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self::new(move |_ctx| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    /// An effect that fails with a fixed declared error.
    pub fn fail(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Self::new(move |_ctx| {
            let error = error.clone();
            async move { Err(error) }
        })
    }

    /// Transform the success value.
    pub fn map<B, F>(self, f: F) -> Effect<B, E, R>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let run = self.run;
        let f = Arc::new(f);
        Effect {
            run: Arc::new(move |ctx| {
                let fut = (run)(ctx);
                let f = f.clone();
                async move { fut.await.map(|a| f(a)) }.boxed()
            }),
        }
    }

    /// Transform the declared error value.
    pub fn map_err<E2, F>(self, f: F) -> Effect<A, E2, R>
    where
        E2: Send + 'static,
        F: Fn(E) -> E2 + Send + Sync + 'static,
    {
        let run = self.run;
        let f = Arc::new(f);
        Effect {
            run: Arc::new(move |ctx| {
                let fut = (run)(ctx);
                let f = f.clone();
                async move { fut.await.map_err(|e| f(e)) }.boxed()
            }),
        }
    }

    /// Start one independent execution of this effect.
    ///
    /// Callers go through the bridge, which layers cancellation and defect
    /// containment on top of the raw future returned here.
    pub(crate) fn launch(&self, ctx: EffectContext<R>) -> BoxFuture<'static, Result<A, E>> {
        (self.run)(ctx)
    }
}

impl<A, E, R> Clone for Effect<A, E, R> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
        }
    }
}

impl<A, E, R> std::fmt::Debug for Effect<A, E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect").finish_non_exhaustive()
    }
}
