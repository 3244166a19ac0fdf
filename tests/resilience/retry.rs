use super::{Calls, fast_policy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_resilience::retry::{RetryEvent, SkipReason};
use storage_resilience::{
    ErrorCategory, ExecuteOptions, Operation, Outcome, ResilientStore, RetryPolicy,
};
use storage_resilience_core::FnListener;

#[tokio::test]
async fn econnrefused_three_times_then_success() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(5))
        .build();
    let calls = Calls::default();
    let c = calls.clone();

    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                let n = c.hit();
                async move {
                    if n < 3 {
                        Err("connect ECONNREFUSED 10.0.0.12:5432")
                    } else {
                        Ok("row")
                    }
                }
            }),
            ExecuteOptions::new(),
        )
        .await;

    assert_eq!(outcome, Outcome::Success("row"));
    assert_eq!(calls.count(), 4);
}

#[tokio::test]
async fn unique_violation_fails_without_retrying() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(5))
        .build();
    let calls = Calls::default();
    let c = calls.clone();

    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Err::<(), _>("duplicate key value violates unique constraint") }
            }),
            ExecuteOptions::new(),
        )
        .await;

    let classification = outcome.classification().expect("failure");
    assert_eq!(classification.category, ErrorCategory::Query);
    assert!(!classification.retryable);
    assert_eq!(calls.count(), 1);
    // No fallback was given, so the resource is marked degraded.
    assert!(store.is_degraded("primary-db"));
}

#[tokio::test]
async fn attempts_never_exceed_max() {
    for max in 1..=5 {
        let store = ResilientStore::builder()
            .retry_policy(fast_policy(max))
            .build();
        let calls = Calls::default();
        let c = calls.clone();

        let outcome = store
            .execute(
                "primary-db",
                Operation::idempotent(move || {
                    c.hit();
                    async { Err::<(), _>("deadlock detected") }
                }),
                ExecuteOptions::new(),
            )
            .await;

        assert!(outcome.is_failure());
        assert_eq!(calls.count(), max as usize);
    }
}

#[tokio::test]
async fn per_call_policy_overrides_default() {
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(5))
        .build();
    let calls = Calls::default();
    let c = calls.clone();

    let _ = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Err::<(), _>("connection reset") }
            }),
            ExecuteOptions::new().policy(fast_policy(2)),
        )
        .await;

    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn narrowed_categories_stop_retries() {
    let policy = RetryPolicy::builder()
        .max_attempts(5)
        .initial_delay(Duration::from_millis(1))
        .retryable_categories([ErrorCategory::Connection])
        .build()
        .unwrap();
    let store = ResilientStore::builder().build();
    let calls = Calls::default();
    let c = calls.clone();

    let _ = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Err::<(), _>("out of memory") }
            }),
            ExecuteOptions::new().policy(policy),
        )
        .await;

    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn writes_need_explicit_opt_in() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&events);
    let store = ResilientStore::builder()
        .retry_policy(fast_policy(4))
        .retry_listener(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::NotRetried { reason, .. } = event {
                e.lock().unwrap().push(*reason);
            }
        }))
        .build();
    let calls = Calls::default();
    let c = calls.clone();

    let outcome = store
        .execute(
            "primary-db",
            Operation::new(move || {
                c.hit();
                async { Err::<(), _>("connection refused") }
            }),
            ExecuteOptions::new(),
        )
        .await;

    assert!(outcome.is_failure());
    assert_eq!(calls.count(), 1);
    assert_eq!(*events.lock().unwrap(), vec![SkipReason::NonIdempotent]);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_and_caps() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delays);
    let policy = RetryPolicy::builder()
        .max_attempts(6)
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(500))
        .jitter_ratio(0.0)
        .build()
        .unwrap();
    let store = ResilientStore::builder()
        .retry_policy(policy)
        .retry_listener(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retry { delay, .. } = event {
                d.lock().unwrap().push(*delay);
            }
        }))
        .build();

    let started = tokio::time::Instant::now();
    let _ = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Err::<(), _>("connection refused") }),
            ExecuteOptions::new(),
        )
        .await;

    let ms = |n| Duration::from_millis(n);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![ms(100), ms(200), ms(400), ms(500), ms(500)]
    );
    assert!(started.elapsed() >= ms(1700));
}

#[tokio::test(start_paused = true)]
async fn attempt_timeout_counts_as_connection_failure() {
    let policy = RetryPolicy::builder()
        .max_attempts(2)
        .initial_delay(Duration::from_millis(10))
        .attempt_timeout(Some(Duration::from_millis(500)))
        .build()
        .unwrap();
    let store = ResilientStore::builder().retry_policy(policy).build();
    let calls = Calls::default();
    let c = calls.clone();

    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, std::io::Error>(())
                }
            }),
            ExecuteOptions::new(),
        )
        .await;

    let classification = outcome.classification().expect("timed out");
    assert_eq!(classification.category, ErrorCategory::Connection);
    assert!(classification.retryable);
    assert_eq!(calls.count(), 2);
}
