//! Provider scopes and the hook entry points.
//!
//! A [`RuntimeScope`] owns one runtime's lifecycle on behalf of a UI
//! provider: mounted once, stabilized by a commit, disposed on unmount.
//! The hooks at the bottom of this module are the adapter's public entry
//! points; each one resolves the scope's runtime, translates a descriptor,
//! and delegates to the cache layer.
//!
//! # Lifecycle
//!
//! ```text
//! Unmounted --mount--> Ready --unmount (after commit)--> Disposed
//! ```
//!
//! Frameworks that speculatively mount and discard render passes unmount
//! scopes that never stabilized. An unmount before [`RuntimeScope::commit`]
//! therefore keeps the runtime alive; only a committed scope disposes on
//! unmount. `Disposed` is terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::bridge::OpKind;
use crate::cache::{PendingFetch, QueryCache, QueryState, SuspenseSignal};
use crate::error::SluiceError;
use crate::layer::{CapabilityRegistry, Layer};
use crate::options::{
    to_mutation_options, to_query_options, MutationDescriptor, QueryDescriptor,
};
use crate::outcome::Cause;
use crate::runtime::Runtime;
use crate::schema::Schema;

enum ScopeState<R> {
    Unmounted,
    Ready(Runtime<R>),
    Disposed,
}

/// Owns one runtime on behalf of a provider.
pub struct RuntimeScope<R> {
    state: Mutex<ScopeState<R>>,
    committed: AtomicBool,
    // Serializes concurrent first mounts so the runtime builds once.
    mount_lock: tokio::sync::Mutex<()>,
}

impl<R> RuntimeScope<R>
where
    R: Send + Sync + 'static,
{
    /// Create an unmounted scope.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScopeState::Unmounted),
            committed: AtomicBool::new(false),
            mount_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ScopeState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount the scope, building its runtime exactly once.
    ///
    /// A second mount on a ready scope is a no-op that returns the existing
    /// runtime. Mounting a disposed scope fails - scopes never resurrect.
    ///
    /// # Errors
    ///
    /// [`SluiceError::LayerBuild`] if capability construction fails; that
    /// failure is fatal to this scope.
    pub async fn mount(
        &self,
        layer: &Layer<R>,
        registry: &CapabilityRegistry,
    ) -> Result<Runtime<R>, SluiceError> {
        match &*self.lock_state() {
            ScopeState::Ready(runtime) => return Ok(runtime.clone()),
            ScopeState::Disposed => return Err(SluiceError::ScopeDisposed),
            ScopeState::Unmounted => {}
        }

        let _guard = self.mount_lock.lock().await;
        // A concurrent mount may have won the lock first.
        match &*self.lock_state() {
            ScopeState::Ready(runtime) => return Ok(runtime.clone()),
            ScopeState::Disposed => return Err(SluiceError::ScopeDisposed),
            ScopeState::Unmounted => {}
        }

        let runtime = Runtime::build(layer, registry).await?;
        *self.lock_state() = ScopeState::Ready(runtime.clone());
        debug!(layer = layer.key(), "scope mounted");
        Ok(runtime)
    }

    /// Mark the scope as stabilized.
    ///
    /// Until this is called, an unmount is treated as the discard of a
    /// speculative render pass and keeps the runtime alive.
    pub fn commit(&self) {
        if matches!(&*self.lock_state(), ScopeState::Ready(_)) {
            self.committed.store(true, Ordering::Release);
            debug!("scope committed");
        }
    }

    /// Unmount the scope.
    ///
    /// On a committed scope this disposes the runtime (once) and the scope
    /// becomes terminally `Disposed`. On an uncommitted scope the runtime
    /// is kept so a remount of the same provider keeps working.
    pub async fn unmount(&self) {
        let runtime = {
            let mut state = self.lock_state();
            match &*state {
                ScopeState::Unmounted => {
                    warn!("unmount on a scope that was never mounted");
                    return;
                }
                ScopeState::Disposed => {
                    warn!("unmount on an already disposed scope");
                    return;
                }
                ScopeState::Ready(_) => {
                    if !self.committed.load(Ordering::Acquire) {
                        debug!("unmount before commit; runtime kept for remount");
                        return;
                    }
                    match std::mem::replace(&mut *state, ScopeState::Disposed) {
                        ScopeState::Ready(runtime) => runtime,
                        _ => unreachable!("state checked above"),
                    }
                }
            }
        };
        runtime.dispose().await;
        debug!("scope unmounted");
    }

    /// Get the scope's runtime.
    ///
    /// # Errors
    ///
    /// [`SluiceError::ScopeNotMounted`] or [`SluiceError::ScopeDisposed`].
    /// Both are configuration errors raised synchronously, never deferred
    /// into a fetch.
    pub fn runtime(&self) -> Result<Runtime<R>, SluiceError> {
        match &*self.lock_state() {
            ScopeState::Unmounted => Err(SluiceError::ScopeNotMounted),
            ScopeState::Disposed => Err(SluiceError::ScopeDisposed),
            ScopeState::Ready(runtime) => Ok(runtime.clone()),
        }
    }

    /// Whether the scope currently holds a runtime.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_state(), ScopeState::Ready(_))
    }

    /// Whether the scope has been terminally disposed.
    pub fn is_disposed(&self) -> bool {
        matches!(&*self.lock_state(), ScopeState::Disposed)
    }
}

impl<R> Default for RuntimeScope<R>
where
    R: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for RuntimeScope<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            ScopeState::Unmounted => "unmounted",
            ScopeState::Ready(_) => "ready",
            ScopeState::Disposed => "disposed",
        };
        f.debug_struct("RuntimeScope")
            .field("state", &state)
            .field("committed", &self.committed.load(Ordering::Acquire))
            .finish()
    }
}

// =============================================================================
// Hooks
// =============================================================================

/// What a suspense query read produced.
///
/// A settled read - success or failure - lands in `Ready`; failures are
/// captured as values, never rethrown across the caller boundary. A read
/// that found a fetch in flight surfaces the pending handle unchanged so
/// the caller's scheduler can await it and retry.
#[derive(Debug)]
pub enum SuspenseRead<A, E> {
    /// The query settled.
    Ready(Result<A, Cause<E>>),
    /// A fetch is in flight; await the handle, then read again.
    Suspended(PendingFetch),
}

impl<A, E> SuspenseRead<A, E> {
    /// Whether this read is waiting on an in-flight fetch.
    pub fn is_suspended(&self) -> bool {
        matches!(self, SuspenseRead::Suspended(_))
    }

    /// The settled outcome, if the read is ready.
    pub fn ready(&self) -> Option<&Result<A, Cause<E>>> {
        match self {
            SuspenseRead::Ready(outcome) => Some(outcome),
            SuspenseRead::Suspended(_) => None,
        }
    }
}

/// Fetch a query through the scope's runtime and resolve its terminal state.
pub async fn use_query<A, E, R, S, C>(
    scope: &RuntimeScope<R>,
    cache: &C,
    descriptor: &QueryDescriptor<A, E, R, S>,
) -> Result<QueryState<A, E>, SluiceError>
where
    A: Send + 'static,
    E: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
    S: Schema<A> + Clone + 'static,
    C: QueryCache,
{
    let runtime = scope.runtime()?;
    let options = to_query_options(descriptor, &runtime, OpKind::Query);
    Ok(cache.fetch_query(options).await)
}

/// Read a query in suspense style through the scope's runtime.
pub async fn use_suspense_query<A, E, R, S, C>(
    scope: &RuntimeScope<R>,
    cache: &C,
    descriptor: &QueryDescriptor<A, E, R, S>,
) -> Result<SuspenseRead<A, E>, SluiceError>
where
    A: Send + 'static,
    E: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
    S: Schema<A> + Clone + 'static,
    C: QueryCache,
{
    let runtime = scope.runtime()?;
    let options = to_query_options(descriptor, &runtime, OpKind::SuspenseQuery);
    Ok(match cache.read_suspense(options).await {
        Ok(value) => SuspenseRead::Ready(Ok(value)),
        Err(SuspenseSignal::Failure(cause)) => SuspenseRead::Ready(Err(cause)),
        Err(SuspenseSignal::Pending(pending)) => SuspenseRead::Suspended(pending),
    })
}

/// Run a mutation through the scope's runtime.
///
/// The outer `Result` is configuration (scope state); the inner one is the
/// mutation's own outcome. There is no suspense variant for mutations.
pub async fn use_mutation<V, A, E, R, C>(
    scope: &RuntimeScope<R>,
    cache: &C,
    descriptor: &MutationDescriptor<V, A, E, R>,
    vars: V,
) -> Result<Result<A, Cause<E>>, SluiceError>
where
    V: Send + 'static,
    A: Send + 'static,
    E: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
    C: QueryCache,
{
    let runtime = scope.runtime()?;
    let options = to_mutation_options(descriptor, &runtime);
    Ok(cache.run_mutation(options, vars).await)
}
