use super::Calls;
use std::time::Duration;
use storage_resilience::{
    CancellationToken, CircuitBreakerConfig, CircuitState, ExecuteOptions, Operation, Outcome,
    ResilientStore, RetryPolicy,
};

fn slow_backoff_store() -> ResilientStore {
    ResilientStore::builder()
        .retry_policy(
            RetryPolicy::builder()
                .max_attempts(5)
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(10))
                .jitter_ratio(0.0)
                .build()
                .unwrap(),
        )
        .build()
}

async fn cancel_during_backoff() {
    let store = slow_backoff_store();
    let token = CancellationToken::new();
    let calls = Calls::default();
    let c = calls.clone();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Err::<(), _>("connection refused") }
            }),
            ExecuteOptions::new().cancel(token),
        )
        .await;

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(calls.count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
    // Cancellation says nothing about the resource.
    assert!(!store.is_degraded("primary-db"));
}

#[tokio::test(flavor = "current_thread")]
async fn cancel_during_backoff_current_thread() {
    cancel_during_backoff().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_during_backoff_multi_thread() {
    cancel_during_backoff().await;
}

#[tokio::test]
async fn already_cancelled_token_runs_nothing() {
    let store = slow_backoff_store();
    let token = CancellationToken::new();
    token.cancel();
    let calls = Calls::default();
    let c = calls.clone();

    let outcome = store
        .execute(
            "primary-db",
            Operation::idempotent(move || {
                c.hit();
                async { Ok::<_, &str>(()) }
            }),
            ExecuteOptions::new().cancel(token),
        )
        .await;

    assert!(outcome.is_cancelled());
    assert_eq!(calls.count(), 0);
}

async fn cancelled_probe_frees_the_slot() {
    let store = ResilientStore::builder()
        .retry_policy(RetryPolicy::builder().max_attempts(1).build().unwrap())
        .circuit_breaker(
            CircuitBreakerConfig::builder()
                .failure_threshold(1)
                .reset_timeout(Duration::from_millis(20))
                .build(),
        )
        .build();

    let _ = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Err::<(), _>("connection refused") }),
            ExecuteOptions::new(),
        )
        .await;
    assert_eq!(store.circuit_state("primary-db"), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.circuit_state("primary-db"), CircuitState::HalfOpen);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let hung = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, &str>(())
            }),
            ExecuteOptions::new().cancel(token),
        )
        .await;
    assert!(hung.is_cancelled());

    let metrics = store.circuit_metrics("primary-db").unwrap();
    assert_eq!(metrics.state, CircuitState::HalfOpen);
    assert!(!metrics.probe_in_flight);

    let next = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Ok::<_, &str>(()) }),
            ExecuteOptions::new(),
        )
        .await;
    assert!(next.is_success());
    assert_eq!(store.circuit_state("primary-db"), CircuitState::Closed);
}

#[tokio::test(flavor = "current_thread")]
async fn cancelled_probe_frees_the_slot_current_thread() {
    cancelled_probe_frees_the_slot().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_probe_frees_the_slot_multi_thread() {
    cancelled_probe_frees_the_slot().await;
}

#[tokio::test]
async fn dropped_call_frees_the_probe_slot() {
    let store = ResilientStore::builder()
        .retry_policy(RetryPolicy::builder().max_attempts(1).build().unwrap())
        .circuit_breaker(
            CircuitBreakerConfig::builder()
                .failure_threshold(1)
                .reset_timeout(Duration::from_millis(20))
                .build(),
        )
        .build();

    let _ = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Err::<(), _>("connection refused") }),
            ExecuteOptions::new(),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        store.execute(
            "primary-db",
            Operation::idempotent(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, &str>(())
            }),
            ExecuteOptions::new(),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    assert!(!store.circuit_metrics("primary-db").unwrap().probe_in_flight);
    let next = store
        .execute(
            "primary-db",
            Operation::idempotent(|| async { Ok::<_, &str>(()) }),
            ExecuteOptions::new(),
        )
        .await;
    assert!(next.is_success());
}
