//! Circuit breaker metrics regression tests

use super::helpers::*;
use serial_test::serial;
use std::time::Duration;
use storage_resilience::{
    CircuitBreakerConfig, ExecuteOptions, Operation, ResilientStore, RetryPolicy,
};

fn store() -> ResilientStore {
    ResilientStore::builder()
        .retry_policy(RetryPolicy::builder().max_attempts(1).build().unwrap())
        .circuit_breaker(
            CircuitBreakerConfig::builder()
                .failure_threshold(2)
                .reset_timeout(Duration::from_secs(60))
                .build(),
        )
        .build()
}

#[tokio::test]
#[serial]
async fn circuit_call_metrics_exist() {
    init_recorder();
    let store = store();

    let _ = store
        .execute(
            "metrics-cb-db",
            Operation::idempotent(|| async { Ok::<_, &str>(()) }),
            ExecuteOptions::new(),
        )
        .await;
    for _ in 0..3 {
        let _ = store
            .execute(
                "metrics-cb-db",
                Operation::idempotent(|| async { Err::<(), _>("connection refused") }),
                ExecuteOptions::new(),
            )
            .await;
    }

    assert_counter_exists("storage_circuit_calls_total");
    assert_metric_has_label("storage_circuit_calls_total", "resource", "metrics-cb-db");
    assert_metric_has_label("storage_circuit_calls_total", "outcome", "success");
    assert_metric_has_label("storage_circuit_calls_total", "outcome", "failure");
    assert_metric_has_label("storage_circuit_calls_total", "outcome", "rejected");
}

#[tokio::test]
#[serial]
async fn circuit_transition_metrics_exist() {
    init_recorder();
    let store = store();

    for _ in 0..2 {
        let _ = store
            .execute(
                "metrics-cb-transitions",
                Operation::idempotent(|| async { Err::<(), _>("out of memory") }),
                ExecuteOptions::new(),
            )
            .await;
    }

    assert_counter_exists("storage_circuit_transitions_total");
    assert_metric_has_label(
        "storage_circuit_transitions_total",
        "resource",
        "metrics-cb-transitions",
    );
    assert_metric_has_label("storage_circuit_transitions_total", "from", "closed");
    assert_metric_has_label("storage_circuit_transitions_total", "to", "open");
}
