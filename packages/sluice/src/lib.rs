//! # Sluice
//!
//! An adapter that lets typed, cancellable effects serve as the fetch and
//! mutate functions of a promise-driven query cache.
//!
//! ## Core Concepts
//!
//! Sluice sits between two worlds that disagree about failure:
//! - An **effect** ([`Effect`]) declares its success type, its error type,
//!   and the capabilities it needs; running one yields an [`Exit`] whose
//!   failure arm is a structured [`Cause`].
//! - A **query cache** ([`QueryCache`]) drives plain futures whose errors
//!   are whatever the fetch function resolved with.
//!
//! The key principle: **structure crosses the boundary intact**. Expected
//! errors, defects, and interruptions each arrive at the cache as a tagged
//! [`Cause`] arm; nothing is stringified and no panic escapes a fetch.
//!
//! ## Architecture
//!
//! ```text
//! provider scope (RuntimeScope)
//!     │ mount / commit / unmount
//!     ▼
//! Runtime<R> ◄── Layer<R> ── CapabilityRegistry (memoized builds)
//!     │
//!     ▼ use_query / use_suspense_query / use_mutation
//! QueryDescriptor ──► to_query_options ──► QueryOptions
//!     │                                        │
//!     ▼                                        ▼ fetch()
//! Effect<A, E, R> ──► bridge::run_to_exit ──► Exit<A, E>
//!     ▲                        │
//!     │ CancellationToken      ▼ encode / decode (Schema)
//! FetchContext.signal     QueryCache storage
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Exits are total** - every run resolves Success or Failure, never
//!    a bare rejection, never left pending after cancellation
//! 2. **Causes are never downgraded** - expected errors, defects, and
//!    interruptions stay distinguishable end to end
//! 3. **Runtimes dispose exactly once** - and only after their scope has
//!    stabilized; uncommitted render passes keep the runtime alive
//! 4. **Descriptors are data** - cloneable, re-creatable every render,
//!    translation captures no per-call state
//! 5. **Caching policy lives elsewhere** - sluice defines the contract and
//!    ships only a test driver
//!
//! ## Example
//!
//! ```ignore
//! use sluice::{
//!     CapabilityRegistry, Effect, JsonSchema, Layer, QueryDescriptor, QueryKey,
//!     RuntimeScope, use_query,
//! };
//!
//! let registry = CapabilityRegistry::new();
//! let layer = Layer::new("api", || async { ApiClient::connect().await });
//!
//! let scope = RuntimeScope::new();
//! scope.mount(&layer, &registry).await?;
//! scope.commit();
//!
//! let members = QueryDescriptor::new(QueryKey::new(["members", "list"]), || {
//!     Effect::new(|ctx| async move { ctx.caps().list_members().await })
//! })
//! .with_schema(JsonSchema::new())
//! .consume_abort_signal(true);
//!
//! let state = use_query(&scope, &cache, &members).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Sluice is **not**:
//! - A query cache (staleness, dedup, and retries belong to the driver)
//! - An effect system (combinators beyond the boundary's needs are out)
//! - A UI framework binding
//!
//! Sluice **is**:
//! > The translation and runtime-lifecycle boundary between typed effects
//! > and a promise-driven cache.

// Core modules
mod bridge;
mod cache;
mod effect;
mod error;
mod layer;
mod options;
mod outcome;
mod runtime;
mod schema;
mod scope;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// End-to-end adapter tests (test-only)
#[cfg(test)]
mod adapter_tests;

// Re-export outcome types
pub use outcome::{Cause, Defect, Exit};

// Re-export effect types
pub use effect::{Effect, EffectContext};

// Re-export layer and registry types
pub use layer::{CapabilityRegistry, Layer};

// Re-export runtime types
pub use runtime::Runtime;

// Re-export bridge types
pub use bridge::{run_to_exit, OpKind, RunOptions};

// Re-export schema types
pub use schema::{DecodeError, IdentitySchema, JsonSchema, Schema};

// Re-export the cache-layer contract
pub use cache::{
    FetchContext, MutationOptions, PendingFetch, QueryCache, QueryKey, QueryOptions, QueryState,
    SuspenseSignal,
};

// Re-export descriptors and translators
pub use options::{
    to_mutation_options, to_query_options, MutationDescriptor, QueryDescriptor,
};

// Re-export scope and hooks
pub use scope::{use_mutation, use_query, use_suspense_query, RuntimeScope, SuspenseRead};

// Re-export error types
pub use error::SluiceError;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
