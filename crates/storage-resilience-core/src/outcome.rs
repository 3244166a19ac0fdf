//! The terminal result of a resilient storage call.

use crate::classify::ErrorClassification;
use std::time::Duration;

/// What a resilient call finally produced.
///
/// `CircuitOpen` and `Cancelled` are deliberately separate from `Failure`:
/// an open circuit is load shedding and a cancellation is the caller's
/// decision, neither says anything new about the operation itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The primary operation succeeded.
    Success(T),
    /// The primary operation failed and no fallback produced a value.
    Failure(ErrorClassification),
    /// The circuit for the resource rejected the call before it ran.
    CircuitOpen {
        /// Resource whose circuit is open.
        resource: String,
        /// How long until the circuit admits a probe call.
        retry_after: Duration,
    },
    /// The primary path failed; the value came from a fallback source.
    Degraded {
        /// The fallback value.
        value: T,
        /// Whether the value may be out of date.
        stale: bool,
    },
    /// The caller cancelled the call before it completed.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns `true` for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns `true` for `Failure`.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Returns `true` for `CircuitOpen`.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Outcome::CircuitOpen { .. })
    }

    /// Returns `true` for `Degraded`.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    /// Returns `true` for `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Returns `true` if the caller got a value, fresh or degraded.
    pub fn has_value(&self) -> bool {
        self.value().is_some()
    }

    /// Borrows the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) | Outcome::Degraded { value: v, .. } => Some(v),
            _ => None,
        }
    }

    /// Extracts the value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(v) | Outcome::Degraded { value: v, .. } => Some(v),
            _ => None,
        }
    }

    /// The failure classification, if this is a `Failure`.
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            Outcome::Failure(c) => Some(c),
            _ => None,
        }
    }

    /// Maps the carried value.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Degraded { value, stale } => Outcome::Degraded {
                value: f(value),
                stale,
            },
            Outcome::Failure(c) => Outcome::Failure(c),
            Outcome::CircuitOpen {
                resource,
                retry_after,
            } => Outcome::CircuitOpen {
                resource,
                retry_after,
            },
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}
