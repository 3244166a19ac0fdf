use super::{Calls, fast_policy};
use std::sync::Arc;
use storage_resilience::{
    CircuitBreakerConfig, Outcome, ResilienceLayer, ResilientStore, StorageRequest,
};
use tower::{Layer, ServiceBuilder, ServiceExt, service_fn};

#[derive(Clone, Debug)]
enum Request {
    Get(&'static str),
    Put(&'static str, u32),
}

impl StorageRequest for Request {
    fn resource_key(&self) -> &str {
        "kv-store"
    }

    fn is_idempotent(&self) -> bool {
        matches!(self, Request::Get(_))
    }
}

fn store(max_attempts: u32) -> Arc<ResilientStore> {
    Arc::new(
        ResilientStore::builder()
            .retry_policy(fast_policy(max_attempts))
            .circuit_breaker(CircuitBreakerConfig::builder().failure_threshold(3).build())
            .build(),
    )
}

#[tokio::test]
async fn reads_are_retried_through_service_builder() {
    let calls = Calls::default();
    let c = calls.clone();
    let backend = service_fn(move |req: Request| {
        let n = c.hit();
        async move {
            match req {
                Request::Get(key) if n >= 1 => Ok(format!("value of {key}")),
                _ => Err("connect ETIMEDOUT 10.1.2.3:6379".to_string()),
            }
        }
    });

    let svc = ServiceBuilder::new()
        .layer(ResilienceLayer::new(store(3)))
        .service(backend);

    let outcome = svc.oneshot(Request::Get("a")).await.unwrap();
    assert_eq!(outcome, Outcome::Success("value of a".to_string()));
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn writes_run_once() {
    let calls = Calls::default();
    let c = calls.clone();
    let backend = service_fn(move |_req: Request| {
        c.hit();
        async { Err::<String, _>("connection reset by peer".to_string()) }
    });

    let svc = ResilienceLayer::new(store(5)).layer(backend);
    let outcome = svc.oneshot(Request::Put("a", 1)).await.unwrap();

    assert!(outcome.is_failure());
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn layer_policy_overrides_store_default() {
    let calls = Calls::default();
    let c = calls.clone();
    let backend = service_fn(move |_req: Request| {
        c.hit();
        async { Err::<String, _>("connection reset by peer".to_string()) }
    });

    let svc = ServiceBuilder::new()
        .layer(ResilienceLayer::new(store(1)).with_policy(fast_policy(2)))
        .service(backend);
    let _ = svc.oneshot(Request::Get("a")).await.unwrap();

    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn shared_store_trips_for_every_service() {
    let shared = store(1);
    let failing = service_fn(|_req: Request| async {
        Err::<String, _>("connection refused".to_string())
    });

    let svc = ServiceBuilder::new()
        .layer(ResilienceLayer::new(Arc::clone(&shared)))
        .service(failing);
    for _ in 0..3 {
        let _ = svc.clone().oneshot(Request::Get("a")).await.unwrap();
    }

    let calls = Calls::default();
    let c = calls.clone();
    let healthy = service_fn(move |_req: Request| {
        c.hit();
        async { Ok::<_, String>("fresh".to_string()) }
    });
    let other = ServiceBuilder::new()
        .layer(ResilienceLayer::new(shared))
        .service(healthy);

    let outcome = other.oneshot(Request::Get("a")).await.unwrap();
    assert!(outcome.is_circuit_open());
    assert_eq!(calls.count(), 0);
}
