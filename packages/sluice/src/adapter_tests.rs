//! End-to-end tests driving the full adapter path: descriptor → runtime →
//! bridge → cache contract → hook result, against the in-memory driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::QueryKey;
use crate::effect::{Effect, EffectContext};
use crate::layer::{CapabilityRegistry, Layer};
use crate::options::{MutationDescriptor, QueryDescriptor};
use crate::schema::JsonSchema;
use crate::scope::{use_mutation, use_query, use_suspense_query, RuntimeScope};
use crate::testing::MemoryCache;
use crate::SluiceError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum ApiError {
    #[error("member not found")]
    NotFound,
}

struct TestCaps {
    base: u64,
    calls: AtomicUsize,
}

fn caps_layer(builds: Arc<AtomicUsize>) -> Layer<TestCaps> {
    Layer::new("test-caps", move || {
        let builds = builds.clone();
        async move {
            builds.fetch_add(1, Ordering::Relaxed);
            Ok(TestCaps {
                base: 100,
                calls: AtomicUsize::new(0),
            })
        }
    })
}

async fn mounted_scope() -> (Arc<RuntimeScope<TestCaps>>, MemoryCache) {
    let scope = Arc::new(RuntimeScope::new());
    let registry = CapabilityRegistry::new();
    scope
        .mount(&caps_layer(Arc::new(AtomicUsize::new(0))), &registry)
        .await
        .unwrap();
    scope.commit();
    (scope, MemoryCache::new())
}

#[tokio::test]
async fn test_query_success_stays_typed_through_the_boundary() {
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "count"]), || {
            Effect::new(|c: EffectContext<TestCaps>| async move { Ok(c.caps().base + 1) })
        });

    let state = use_query(&scope, &cache, &descriptor).await.unwrap();
    assert_eq!(state.success(), Some(&101));
}

#[tokio::test]
async fn test_query_expected_failure_keeps_its_error_type() {
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "absent"]), || {
            Effect::fail(ApiError::NotFound)
        });

    let state = use_query(&scope, &cache, &descriptor).await.unwrap();
    assert_eq!(state.error().unwrap().expected(), Some(&ApiError::NotFound));
}

#[tokio::test]
async fn test_query_panic_is_contained_as_defect() {
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "broken"]), || {
            Effect::new(|_c| async { panic!("corrupt row") })
        });

    let state = use_query(&scope, &cache, &descriptor).await.unwrap();
    let cause = state.error().unwrap();
    assert!(cause.expected().is_none());
    assert!(cause.defect().unwrap().to_string().contains("corrupt row"));
}

#[tokio::test]
async fn test_cache_abort_interrupts_opted_in_query_and_skips_storage() {
    let (scope, cache) = mounted_scope().await;
    let key = QueryKey::new(["members", "slow"]);
    let descriptor = QueryDescriptor::<u64, ApiError, TestCaps>::new(key.clone(), || {
        Effect::new(|_c| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(0)
        })
    })
    .consume_abort_signal(true);

    let handle = {
        let scope = scope.clone();
        let cache = cache.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move { use_query(&scope, &cache, &descriptor).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.cancel_inflight(&key);

    let state = handle.await.unwrap().unwrap();
    assert!(state.error().unwrap().is_interrupted());
    // Interruption is not a settled state; nothing was stored.
    assert!(!cache.contains(&key));
}

#[tokio::test]
async fn test_query_without_opt_in_ignores_cache_abort() {
    let (scope, cache) = mounted_scope().await;
    let key = QueryKey::new(["members", "steady"]);
    let descriptor = QueryDescriptor::<u64, ApiError, TestCaps>::new(key.clone(), || {
        Effect::new(|_c| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(7)
        })
    });

    let handle = {
        let scope = scope.clone();
        let cache = cache.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move { use_query(&scope, &cache, &descriptor).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.cancel_inflight(&key);

    let state = handle.await.unwrap().unwrap();
    assert_eq!(state.success(), Some(&7));
}

#[tokio::test]
async fn test_suspense_handshake_pending_then_ready() {
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "lazy"]), || {
            Effect::new(|c: EffectContext<TestCaps>| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(c.caps().base)
            })
        });

    let first = use_suspense_query(&scope, &cache, &descriptor)
        .await
        .unwrap();
    let pending = match first {
        crate::SuspenseRead::Suspended(pending) => pending,
        other => panic!("expected suspension, got {other:?}"),
    };
    pending.wait().await;

    let second = use_suspense_query(&scope, &cache, &descriptor)
        .await
        .unwrap();
    assert_eq!(second.ready().unwrap().as_ref().unwrap(), &100);
}

#[tokio::test]
async fn test_suspense_failure_is_captured_not_rethrown() {
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "gone"]), || {
            Effect::fail(ApiError::NotFound)
        });

    let first = use_suspense_query(&scope, &cache, &descriptor)
        .await
        .unwrap();
    let pending = match first {
        crate::SuspenseRead::Suspended(pending) => pending,
        other => panic!("expected suspension, got {other:?}"),
    };
    pending.wait().await;

    let second = use_suspense_query(&scope, &cache, &descriptor)
        .await
        .unwrap();
    let outcome = second.ready().unwrap();
    assert_eq!(
        outcome.as_ref().unwrap_err().expected(),
        Some(&ApiError::NotFound)
    );
}

#[tokio::test]
async fn test_mutation_runs_with_capabilities() {
    let (scope, cache) = mounted_scope().await;
    let descriptor = MutationDescriptor::<u64, u64, ApiError, TestCaps>::new(
        QueryKey::new(["members", "rename"]),
        |vars| {
            Effect::new(move |c: EffectContext<TestCaps>| async move {
                c.caps().calls.fetch_add(1, Ordering::Relaxed);
                Ok(c.caps().base + vars)
            })
        },
    );

    let outcome = use_mutation(&scope, &cache, &descriptor, 5).await.unwrap();
    assert_eq!(outcome.unwrap(), 105);
}

#[tokio::test]
async fn test_mutation_failure_keeps_cause() {
    let (scope, cache) = mounted_scope().await;
    let descriptor = MutationDescriptor::<u64, u64, ApiError, TestCaps>::new(
        QueryKey::new(["members", "rename"]),
        |_vars| Effect::fail(ApiError::NotFound),
    );

    let outcome = use_mutation(&scope, &cache, &descriptor, 5).await.unwrap();
    assert_eq!(outcome.unwrap_err().expected(), Some(&ApiError::NotFound));
}

#[tokio::test]
async fn test_hooks_fail_fast_on_scope_misuse() {
    let cache = MemoryCache::new();
    let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members"]), || Effect::succeed(1));

    let unmounted = RuntimeScope::<TestCaps>::new();
    let err = use_query(&unmounted, &cache, &descriptor).await.unwrap_err();
    assert!(matches!(err, SluiceError::ScopeNotMounted));

    let registry = CapabilityRegistry::new();
    let scope = RuntimeScope::new();
    scope
        .mount(&caps_layer(Arc::new(AtomicUsize::new(0))), &registry)
        .await
        .unwrap();
    scope.commit();
    scope.unmount().await;

    let err = use_query(&scope, &cache, &descriptor).await.unwrap_err();
    assert!(matches!(err, SluiceError::ScopeDisposed));
}

#[tokio::test]
async fn test_json_schema_round_trips_through_the_cache() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Member {
        id: u64,
        name: String,
    }

    let (scope, cache) = mounted_scope().await;
    let descriptor = QueryDescriptor::<Member, ApiError, TestCaps>::new(
        QueryKey::new(["members", "detail", "3"]),
        || {
            Effect::succeed(Member {
                id: 3,
                name: "ada".into(),
            })
        },
    )
    .with_schema(JsonSchema::new());

    let state = use_query(&scope, &cache, &descriptor).await.unwrap();
    assert_eq!(
        state.success(),
        Some(&Member {
            id: 3,
            name: "ada".into()
        })
    );

    // Second read decodes from stored wire shape rather than refetching.
    let again = use_query(&scope, &cache, &descriptor).await.unwrap();
    assert_eq!(again.success().map(|m| m.name.as_str()), Some("ada"));
}

#[tokio::test]
async fn test_one_layer_build_serves_many_hooks() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = CapabilityRegistry::new();
    let scope = Arc::new(RuntimeScope::new());
    scope
        .mount(&caps_layer(builds.clone()), &registry)
        .await
        .unwrap();
    scope.commit();
    let cache = MemoryCache::new();

    for name in ["a", "b", "c"] {
        let descriptor: QueryDescriptor<u64, ApiError, TestCaps> =
            QueryDescriptor::new(QueryKey::new(["members", name]), || {
                Effect::new(|c: EffectContext<TestCaps>| async move { Ok(c.caps().base) })
            });
        let state = use_query(&scope, &cache, &descriptor).await.unwrap();
        assert_eq!(state.success(), Some(&100));
    }
    assert_eq!(builds.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_effect_can_cooperate_with_the_abort_signal() {
    let (scope, cache) = mounted_scope().await;
    let key = QueryKey::new(["members", "cooperative"]);
    let descriptor = QueryDescriptor::<u64, ApiError, TestCaps>::new(key.clone(), || {
        Effect::new(|c| {
            let signal = c.signal().clone();
            async move {
                tokio::select! {
                    _ = signal.cancelled() => Ok(0),
                    _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(1),
                }
            }
        })
    })
    .consume_abort_signal(true);

    let handle = {
        let scope = scope.clone();
        let cache = cache.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move { use_query(&scope, &cache, &descriptor).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.cancel_inflight(&key);

    // The bridge resolves interruption even though the effect itself chose
    // to return a value on cancellation.
    let state = handle.await.unwrap().unwrap();
    assert!(state.error().unwrap().is_interrupted());
}

#[tokio::test]
async fn test_bridge_signal_independent_of_cache_token_identity() {
    // A descriptor that never opts in still gets a live, never-fired
    // signal in its context.
    let (scope, cache) = mounted_scope().await;
    let descriptor: QueryDescriptor<bool, ApiError, TestCaps> =
        QueryDescriptor::new(QueryKey::new(["members", "signal"]), || {
            Effect::new(|c| {
                let fired = c.signal().is_cancelled();
                async move { Ok(fired) }
            })
        });

    let state = use_query(&scope, &cache, &descriptor).await.unwrap();
    assert_eq!(state.success(), Some(&false));
}
