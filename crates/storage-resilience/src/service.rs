//! Tower integration.
//!
//! [`ResilienceLayer`] wraps any storage client exposed as a
//! [`tower::Service`]. Each request names its resource key and says whether
//! it is idempotent; the wrapped service answers every call with an
//! [`Outcome`] and never fails itself.

use crate::store::{ExecuteOptions, ResilientStore};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};
use storage_resilience_core::Outcome;
use storage_resilience_retry::{Operation, RetryPolicy};
use tower::{Layer, Service, ServiceExt};

/// A request a [`ResilientService`] can route.
pub trait StorageRequest {
    /// The resource this request targets, e.g. `"primary-db"`.
    fn resource_key(&self) -> &str;

    /// Whether the request may be repeated safely. Defaults to `false`.
    fn is_idempotent(&self) -> bool {
        false
    }
}

/// A Tower layer that routes every call through a [`ResilientStore`].
#[derive(Clone, Debug)]
pub struct ResilienceLayer {
    store: Arc<ResilientStore>,
    policy: Option<RetryPolicy>,
}

impl ResilienceLayer {
    /// Creates a layer backed by `store`.
    pub fn new(store: Arc<ResilientStore>) -> Self {
        Self {
            store,
            policy: None,
        }
    }

    /// Uses `policy` instead of the store's default.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl<S> Layer<S> for ResilienceLayer {
    type Service = ResilientService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResilientService {
            inner,
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

/// A service that runs each request through a [`ResilientStore`].
#[derive(Clone, Debug)]
pub struct ResilientService<S> {
    inner: S,
    store: Arc<ResilientStore>,
    policy: Option<RetryPolicy>,
}

impl<S, Req> Service<Req> for ResilientService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Display + Send,
    S::Response: Clone + Send + 'static,
    Req: StorageRequest + Clone + Send + 'static,
{
    type Response = Outcome<S::Response>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited per attempt, so that a
        // not-ready backend goes through classification like any failure.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        let store = Arc::clone(&self.store);
        let policy = self.policy.clone();

        Box::pin(async move {
            let resource = req.resource_key().to_string();
            let idempotent = req.is_idempotent();
            let operation = Operation::new(move || {
                let svc = inner.clone();
                let req = req.clone();
                async move { svc.oneshot(req).await }
            })
            .with_idempotent(idempotent);

            let mut options = ExecuteOptions::new();
            if let Some(policy) = policy {
                options = options.policy(policy);
            }
            Ok(store.execute(&resource, operation, options).await)
        })
    }
}
