use crate::circuit::CircuitState;
use std::time::{Duration, Instant};
use storage_resilience_core::ResilienceEvent;

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        resource: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was let through. `probe` is set for the single HALF_OPEN trial call.
    CallPermitted {
        resource: String,
        timestamp: Instant,
        state: CircuitState,
        probe: bool,
    },
    /// A call was rejected without reaching the resource.
    CallRejected {
        resource: String,
        timestamp: Instant,
        retry_after: Duration,
    },
    /// A successful call was recorded.
    SuccessRecorded {
        resource: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A failed call was recorded.
    FailureRecorded {
        resource: String,
        timestamp: Instant,
        state: CircuitState,
        failure_count: u32,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn resource_key(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { resource, .. }
            | CircuitBreakerEvent::CallPermitted { resource, .. }
            | CircuitBreakerEvent::CallRejected { resource, .. }
            | CircuitBreakerEvent::SuccessRecorded { resource, .. }
            | CircuitBreakerEvent::FailureRecorded { resource, .. } => resource,
        }
    }
}
