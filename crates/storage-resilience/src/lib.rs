//! Resilient data access for storage backends.
//!
//! `storage-resilience` sits between application code and any storage
//! backend. Every call goes through:
//!
//! 1. an **error classifier** that sorts raw failures into Connection, Query,
//!    Transaction, Resource, Operational and Unknown, and decides whether a
//!    retry could help
//! 2. a **retry executor** with bounded exponential backoff and jitter that
//!    never repeats a non-idempotent operation unless told to
//! 3. a per-resource **circuit breaker** that sheds load from a resource that
//!    keeps failing
//! 4. a **fallback coordinator** that serves stale data from a cache or
//!    replica when the primary path fails
//! 5. a **degraded-mode monitor** that remembers which resources are down and
//!    probes them for recovery
//! 6. a **response mapper** that turns the final [`Outcome`] into a stable
//!    code and message, never a raw storage error
//!
//! ## Quick start
//!
//! ```rust
//! use storage_resilience::{
//!     ExecuteOptions, Fallback, FallbackCache, InMemoryCache, OperationKind, Operation,
//!     ResilientStore, RetryPolicy,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let store = ResilientStore::builder()
//!     .retry_policy(RetryPolicy::builder().max_attempts(5).build().unwrap())
//!     .recovery_probe("primary-db", |_resource: &str| async { true })
//!     .on_notification(|n| eprintln!("alert: {n:?}"))
//!     .build();
//!
//! let cache: Arc<dyn FallbackCache<String>> = Arc::new(InMemoryCache::new(1024));
//! let outcome = store
//!     .execute(
//!         "primary-db",
//!         Operation::idempotent(|| async { Ok::<_, std::io::Error>("alice".to_string()) }),
//!         ExecuteOptions::new().fallback(Fallback::cache(cache, "user:1", Duration::from_secs(300))),
//!     )
//!     .await;
//!
//! let result = store.to_caller_result(&outcome, OperationKind::Read);
//! assert_eq!(result.code.http_status(), 200);
//! # }
//! ```
//!
//! ## Crates
//!
//! Each component lives in its own crate and is re-exported here:
//!
//! - [`core`]: classifier, [`Outcome`], events, notifications, clocks
//! - [`circuitbreaker`]: per-resource circuit breaker and registry
//! - [`retry`]: [`RetryPolicy`] and the retry executor
//! - [`degraded`]: degraded-mode monitor
//! - [`fallback`]: fallback coordinator and caches
//!
//! ## Feature flags
//!
//! - `serde`: deserialize [`ResilienceSettings`] and serialize caller results
//! - `metrics`: emit counters through the `metrics` facade

pub use storage_resilience_circuitbreaker as circuitbreaker;
pub use storage_resilience_core as core;
pub use storage_resilience_degraded as degraded;
pub use storage_resilience_fallback as fallback;
pub use storage_resilience_retry as retry;

mod config;
mod response;
mod service;
mod store;

pub use config::{
    CircuitBreakerSettings, DegradedSettings, ResilienceSettings, RetrySettings, SettingsError,
};
pub use response::{CallerResult, OperationKind, ResponseCode, ResponseMapper};
pub use service::{ResilienceLayer, ResilientService, StorageRequest};
pub use store::{ExecuteOptions, ResilientStore, ResilientStoreBuilder};

pub use storage_resilience_circuitbreaker::{CircuitBreakerConfig, CircuitState};
pub use storage_resilience_core::{
    classify, ErrorCategory, ErrorClassification, Notification, Outcome,
};
pub use storage_resilience_degraded::{DegradedConfig, RecoveryProbe};
pub use storage_resilience_fallback::{CacheError, Fallback, FallbackCache, InMemoryCache};
pub use storage_resilience_retry::{Operation, PolicyError, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
