//! Degraded-mode stress tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use storage_resilience::{
    DegradedConfig, ExecuteOptions, Notification, Operation, ResilientStore, RetryPolicy,
};

use super::init_tracing;

/// Test: many resources entering degraded mode concurrently, one probe each
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_many_resources_one_probe_each() {
    init_tracing();
    let probes = Arc::new(AtomicUsize::new(0));
    let recovered = Arc::new(AtomicUsize::new(0));

    let mut builder = ResilientStore::builder()
        .retry_policy(RetryPolicy::builder().max_attempts(1).build().unwrap())
        .degraded(
            DegradedConfig::builder()
                .probe_interval(Duration::from_millis(200))
                .build(),
        );
    for i in 0..200 {
        let probes = Arc::clone(&probes);
        builder = builder.recovery_probe(format!("shard-{i}"), move |_resource: &str| {
            probes.fetch_add(1, Ordering::SeqCst);
            async { true }
        });
    }
    let r = Arc::clone(&recovered);
    let store = Arc::new(
        builder
            .on_notification(move |n| {
                if matches!(n, Notification::Recovered { .. }) {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build(),
    );

    let mut handles = Vec::new();
    for i in 0..200 {
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .execute(
                        &format!("shard-{i}"),
                        Operation::idempotent(|| async { Err::<(), _>("connection refused") }),
                        ExecuteOptions::new(),
                    )
                    .await
            }));
        }
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }
    assert_eq!(store.monitor().degraded_resources().len(), 200);

    tokio::time::sleep(Duration::from_millis(600)).await;

    println!("Probe calls: {}", probes.load(Ordering::SeqCst));
    assert_eq!(probes.load(Ordering::SeqCst), 200);
    assert_eq!(recovered.load(Ordering::SeqCst), 200);
    assert!(store.monitor().degraded_resources().is_empty());
}
