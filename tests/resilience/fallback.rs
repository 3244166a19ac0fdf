use super::{Calls, fast_policy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_resilience::fallback::FallbackEvent;
use storage_resilience::{
    CircuitBreakerConfig, ErrorCategory, ExecuteOptions, Fallback, FallbackCache, InMemoryCache,
    Notification, Operation, Outcome, ResilientStore,
};
use storage_resilience_core::FnListener;

fn failing() -> Operation<impl FnMut() -> std::future::Ready<Result<String, &'static str>>> {
    Operation::idempotent(|| std::future::ready(Err::<String, _>("connection refused")))
}

#[tokio::test]
async fn accessor_value_is_returned_as_stale() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(2))
        .build();

    let outcome = store
        .execute(
            "primary-db",
            failing(),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async {
                Ok::<_, &str>("from replica".to_string())
            })),
        )
        .await;

    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: "from replica".to_string(),
            stale: true
        }
    );
    assert!(!store.is_degraded("primary-db"));
}

#[tokio::test]
async fn failing_fallback_enters_degraded_mode() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(2))
        .build();

    let outcome = store
        .execute(
            "primary-db",
            failing(),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async {
                Err::<String, _>("replica unreachable")
            })),
        )
        .await;

    assert_eq!(
        outcome.classification().map(|c| c.category),
        Some(ErrorCategory::Connection)
    );
    assert!(store.is_degraded("primary-db"));
}

#[tokio::test]
async fn missing_fallback_enters_degraded_mode() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .build();

    let outcome = store
        .execute("primary-db", failing(), ExecuteOptions::new())
        .await;

    assert!(outcome.is_failure());
    assert!(store.is_degraded("primary-db"));
    assert!(!store.is_degraded("replica-db"));
}

#[tokio::test]
async fn cache_is_refreshed_on_success_and_served_on_failure() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .build();
    let cache: Arc<dyn FallbackCache<String>> = Arc::new(InMemoryCache::new(16));
    let ttl = Duration::from_secs(60);

    let fresh = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Ok::<_, &str>("alice".to_string()) }),
            ExecuteOptions::new().fallback(Fallback::cache(Arc::clone(&cache), "user:1", ttl)),
        )
        .await;
    assert_eq!(fresh, Outcome::Success("alice".to_string()));

    let stale = store
        .execute(
            "primary-db",
            failing(),
            ExecuteOptions::new().fallback(Fallback::cache(Arc::clone(&cache), "user:1", ttl)),
        )
        .await;
    assert_eq!(
        stale,
        Outcome::Degraded {
            value: "alice".to_string(),
            stale: true
        }
    );
}

#[tokio::test]
async fn cache_miss_counts_as_failed_fallback() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .build();
    let cache: Arc<dyn FallbackCache<String>> = Arc::new(InMemoryCache::new(16));

    let outcome = store
        .execute(
            "primary-db",
            failing(),
            ExecuteOptions::new().fallback(Fallback::cache(cache, "user:404", Duration::from_secs(60))),
        )
        .await;

    assert!(outcome.is_failure());
    assert!(store.is_degraded("primary-db"));
}

#[tokio::test]
async fn open_circuit_is_served_from_fallback() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .circuit_breaker(CircuitBreakerConfig::builder().failure_threshold(1).build())
        .build();
    let calls = Calls::default();

    let _ = store
        .execute("primary-db", failing(), ExecuteOptions::new())
        .await;

    let c = calls.clone();
    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Ok::<_, &str>("fresh".to_string()) }
            }),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async {
                Ok::<_, &str>("cached".to_string())
            })),
        )
        .await;

    assert_eq!(calls.count(), 0);
    assert_eq!(outcome.value().map(String::as_str), Some("cached"));
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn transaction_failures_are_served_from_fallback() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .build();

    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Err::<u32, _>("ERROR: deadlock detected") }),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async { Ok::<_, &str>(7u32) })),
        )
        .await;

    assert_eq!(outcome, Outcome::Degraded { value: 7, stale: true });
}

#[tokio::test]
async fn query_failures_with_failing_fallback_enter_degraded_mode() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .build();

    let outcome = store
        .execute(
            "db2",
            Operation::idempotent(|| async {
                Err::<String, _>("relation \"users\" does not exist")
            }),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async {
                Err::<String, _>("replica unreachable")
            })),
        )
        .await;

    assert!(outcome.is_failure());
    assert!(store.is_degraded("db2"));
}

#[tokio::test]
async fn answered_failures_can_skip_the_fallback() {
    let fallback_calls = Calls::default();
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(3))
        .pass_through_answered_failures()
        .build();

    let fc = fallback_calls.clone();
    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async {
                Err::<String, _>("relation \"users\" does not exist")
            }),
            ExecuteOptions::new().fallback(Fallback::accessor(move || {
                fc.hit();
                async { Ok::<_, &str>("stale".to_string()) }
            })),
        )
        .await;

    assert_eq!(
        outcome.classification().map(|c| c.category),
        Some(ErrorCategory::Query)
    );
    assert_eq!(fallback_calls.count(), 0);
    assert!(!store.is_degraded("primary-db"));
}

#[tokio::test]
async fn notifications_reach_sinks_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .circuit_breaker(CircuitBreakerConfig::builder().failure_threshold(1).build())
        .on_notification(move |n| {
            let kind = match n {
                Notification::CircuitOpened { .. } => "circuit_opened",
                Notification::EnteredDegraded { .. } => "entered_degraded",
                Notification::Recovered { .. } => "recovered",
            };
            s.lock().unwrap().push(kind);
        })
        .build();

    let _ = store
        .execute("primary-db", failing(), ExecuteOptions::new())
        .await;
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["circuit_opened", "entered_degraded"]
    );

    // A second failure while already degraded stays quiet.
    let _ = store
        .execute("primary-db", failing(), ExecuteOptions::new())
        .await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn fallback_events_describe_the_strategy() {
    let strategies = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&strategies);
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(1))
        .fallback_listener(FnListener::new(move |event: &FallbackEvent| {
            if let FallbackEvent::Applied { strategy, .. } = event {
                s.lock().unwrap().push(*strategy);
            }
        }))
        .build();

    let _ = store
        .execute(
            "primary-db",
            failing(),
            ExecuteOptions::new().fallback(Fallback::accessor(|| async {
                Ok::<_, &str>("replica".to_string())
            })),
        )
        .await;

    assert_eq!(*strategies.lock().unwrap(), vec!["accessor"]);
}
