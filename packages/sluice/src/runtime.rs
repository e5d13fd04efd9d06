//! Runtime handles over built capability sets.
//!
//! A [`Runtime`] is a constructed, running execution context bound to a
//! resolved capability set. It is cheap to clone (all clones share one
//! inner state) and owned, in the disposal sense, by exactly one provider
//! scope.
//!
//! # Lifecycle
//!
//! Created via [`Runtime::build`] when a scope mounts; disposed exactly once
//! when the scope unmounts. Disposal runs the layer's teardown and poisons
//! the handle: every later capability access fails fast with
//! [`SluiceError::RuntimeDisposed`]. In-flight runs are not awaited before
//! disposal - they fail on their next capability access.
//!
//! Capabilities built through a [`CapabilityRegistry`] outlive the runtime:
//! the registry keeps its shared instance so the next runtime built from
//! the same layer reuses it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::SluiceError;
use crate::layer::{CapabilityRegistry, Layer};

type TeardownFn<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, ()> + Send + Sync>;

struct RuntimeInner<R> {
    layer_key: String,
    caps: Arc<R>,
    teardown: Option<TeardownFn<R>>,
    disposed: AtomicBool,
}

/// A handle to a built capability set, shared across all hook invocations
/// within one provider scope.
pub struct Runtime<R> {
    inner: Arc<RuntimeInner<R>>,
}

impl<R> Runtime<R>
where
    R: Send + Sync + 'static,
{
    /// Build (or reuse, via the registry) the capability set described by
    /// `layer` and wrap it in a runtime handle.
    ///
    /// # Errors
    ///
    /// Returns [`SluiceError::LayerBuild`] if capability construction
    /// fails. That failure is fatal to the owning scope; sluice performs no
    /// retry.
    pub async fn build(
        layer: &Layer<R>,
        registry: &CapabilityRegistry,
    ) -> Result<Self, SluiceError> {
        let caps = registry.get_or_build(layer).await?;
        debug!(layer = layer.key(), "runtime ready");
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                layer_key: layer.key().to_string(),
                caps,
                teardown: layer.teardown_fn(),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    /// Get the capability set, failing fast if the runtime was disposed.
    pub fn capabilities(&self) -> Result<Arc<R>, SluiceError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(SluiceError::RuntimeDisposed);
        }
        Ok(self.inner.caps.clone())
    }

    /// Whether this runtime has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Dispose the runtime, running the layer teardown at most once.
    ///
    /// Safe to call more than once; every call after the first is a no-op.
    /// Disposal does not wait for in-flight runs.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            warn!(layer = %self.inner.layer_key, "runtime already disposed");
            return;
        }
        if let Some(teardown) = &self.inner.teardown {
            teardown(self.inner.caps.clone()).await;
        }
        debug!(layer = %self.inner.layer_key, "runtime disposed");
    }

    /// The identity key of the layer this runtime was built from.
    pub fn layer_key(&self) -> &str {
        &self.inner.layer_key
    }
}

impl<R> Clone for Runtime<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Runtime<R>
where
    R: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("layer", &self.inner.layer_key)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
