//! Capability configuration layers and the process-wide memo registry.
//!
//! A [`Layer`] describes how to construct the capability set an effect
//! needs. Layers are values: composed, never mutated. Building goes through
//! a [`CapabilityRegistry`], an explicit memoization table keyed by layer
//! identity, so expensive capability construction happens once per registry
//! even when multiple runtimes are instantiated from the same layer.
//!
//! The registry is dependency-injected rather than a hidden global: the
//! application creates one at process start and threads it to every
//! provider scope; tests create fresh registries to avoid cross-test
//! leakage. Entries live for the lifetime of the registry - there is no
//! eviction.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::error::SluiceError;

type BuildFn<R> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;
type TeardownFn<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A composable description of how to construct a capability set.
///
/// The `key` is the layer's identity in the memo registry: two layers with
/// the same key share one constructed instance.
pub struct Layer<R> {
    key: String,
    build: BuildFn<R>,
    teardown: Option<TeardownFn<R>>,
}

impl<R> Layer<R>
where
    R: Send + Sync + 'static,
{
    /// Create a layer from an identity key and an async builder.
    ///
    /// The builder may perform IO (opening clients, connections). A builder
    /// failure surfaces as [`SluiceError::LayerBuild`] and is fatal to the
    /// scope that requested the build.
    pub fn new<F, Fut>(key: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self {
            key: key.into(),
            build: Arc::new(move || build().boxed()),
            teardown: None,
        }
    }

    /// Attach an async teardown, run when an owning runtime is disposed.
    pub fn with_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.teardown = Some(Arc::new(move |caps| teardown(caps).boxed()));
        self
    }

    /// Compose two layers into one that builds both capability sets.
    ///
    /// The merged layer's identity is derived from both keys, so a merged
    /// pair memoizes independently of its parts. Teardown runs both halves.
    pub fn merge<R2>(self, other: Layer<R2>) -> Layer<(Arc<R>, Arc<R2>)>
    where
        R2: Send + Sync + 'static,
    {
        let key = format!("{}+{}", self.key, other.key);
        let build_a = self.build.clone();
        let build_b = other.build.clone();
        let teardown_a = self.teardown.clone();
        let teardown_b = other.teardown.clone();

        let mut merged = Layer::new(key, move || {
            let build_a = build_a.clone();
            let build_b = build_b.clone();
            async move {
                let a = build_a().await?;
                let b = build_b().await?;
                Ok((Arc::new(a), Arc::new(b)))
            }
        });
        merged.teardown = Some(Arc::new(move |caps: Arc<(Arc<R>, Arc<R2>)>| {
            let teardown_a = teardown_a.clone();
            let teardown_b = teardown_b.clone();
            async move {
                if let Some(t) = teardown_a {
                    t(caps.0.clone()).await;
                }
                if let Some(t) = teardown_b {
                    t(caps.1.clone()).await;
                }
            }
            .boxed()
        }));
        merged
    }

    /// The layer's identity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn build_fn(&self) -> BuildFn<R> {
        self.build.clone()
    }

    pub(crate) fn teardown_fn(&self) -> Option<TeardownFn<R>> {
        self.teardown.clone()
    }
}

impl<R> Clone for Layer<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            build: self.build.clone(),
            teardown: self.teardown.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Layer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer").field("key", &self.key).finish()
    }
}

// =============================================================================
// Capability Registry
// =============================================================================

/// Explicit memoization table for constructed capability sets.
///
/// Keyed by layer identity. Append-only for its lifetime: entries are never
/// evicted, so capabilities built here are shared for as long as the
/// registry lives (typically the whole process).
///
/// # Example
///
/// ```ignore
/// let registry = CapabilityRegistry::new();
/// let rt_a = Runtime::build(&layer, &registry).await?;
/// let rt_b = Runtime::build(&layer, &registry).await?;
/// // rt_a and rt_b share one constructed capability instance
/// ```
pub struct CapabilityRegistry {
    built: DashMap<String, Arc<dyn Any + Send + Sync>>,
    // Serializes slow-path construction so one layer never builds twice.
    build_lock: tokio::sync::Mutex<()>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            built: DashMap::new(),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Return the memoized capability set for `layer`, building it first if
    /// this is the layer's first use against this registry.
    pub async fn get_or_build<R>(&self, layer: &Layer<R>) -> Result<Arc<R>, SluiceError>
    where
        R: Send + Sync + 'static,
    {
        if let Some(entry) = self.built.get(layer.key()) {
            return Self::downcast(layer.key(), entry.value().clone());
        }

        let _guard = self.build_lock.lock().await;
        // Another build may have won the lock first.
        if let Some(entry) = self.built.get(layer.key()) {
            return Self::downcast(layer.key(), entry.value().clone());
        }

        debug!(layer = layer.key(), "building capability set");
        let caps = (layer.build_fn())()
            .await
            .map_err(|source| SluiceError::LayerBuild {
                layer: layer.key().to_string(),
                source,
            })?;
        let caps = Arc::new(caps);
        self.built
            .insert(layer.key().to_string(), caps.clone() as Arc<dyn Any + Send + Sync>);
        Ok(caps)
    }

    /// Number of memoized capability sets.
    pub fn len(&self) -> usize {
        self.built.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }

    fn downcast<R>(key: &str, entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<R>, SluiceError>
    where
        R: Send + Sync + 'static,
    {
        entry
            .downcast::<R>()
            .map_err(|_| SluiceError::CapabilityTypeConflict {
                layer: key.to_string(),
            })
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("entries", &self.built.len())
            .finish_non_exhaustive()
    }
}
