//! Recovery probes.

use futures::future::BoxFuture;
use std::future::Future;

/// Checks whether a degraded resource answers again.
///
/// A probe should be cheap, a no-op query such as `SELECT 1`. It returns
/// `true` when the resource is healthy.
///
/// # Examples
///
/// Using a closure (via blanket impl):
///
/// ```rust
/// use storage_resilience_degraded::RecoveryProbe;
///
/// let ping = |_resource: &str| async { true };
/// # fn assert_probe<P: RecoveryProbe>(_: &P) {}
/// # assert_probe(&ping);
/// ```
///
/// Implementing the trait:
///
/// ```rust
/// use futures::future::BoxFuture;
/// use storage_resilience_degraded::RecoveryProbe;
///
/// struct SelectOne;
///
/// impl RecoveryProbe for SelectOne {
///     fn probe(&self, _resource: &str) -> BoxFuture<'static, bool> {
///         Box::pin(async { true })
///     }
/// }
/// ```
pub trait RecoveryProbe: Send + Sync {
    /// Runs one probe against `resource`.
    fn probe(&self, resource: &str) -> BoxFuture<'static, bool>;
}

impl<F, Fut> RecoveryProbe for F
where
    F: Fn(&str) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn probe(&self, resource: &str) -> BoxFuture<'static, bool> {
        Box::pin(self(resource))
    }
}
