use std::time::Duration;
use thiserror::Error;

/// A call was rejected because the resource's circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit for '{resource}' is open; retry after {retry_after:?}")]
pub struct CircuitOpenError {
    /// Resource whose circuit rejected the call.
    pub resource: String,
    /// Time until the circuit admits a probe call.
    pub retry_after: Duration,
}

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error(transparent)]
    OpenCircuit(#[from] CircuitOpenError),

    /// The operation ran and failed.
    #[error("storage operation failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the error indicates the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit(_))
    }

    /// Returns the operation's error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
