use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit admits a single probe call.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures recorded while CLOSED.
    pub failure_count: u32,
    /// When the circuit last tripped or a probe last failed.
    pub last_failure_time: Option<Instant>,
    /// Whether the HALF_OPEN probe slot is taken.
    pub probe_in_flight: bool,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

/// How a permitted call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Normal,
    Probe,
}

pub(crate) struct Circuit {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    probe_in_flight: bool,
    /// Events raised under the lock, emitted by the caller once it is released.
    pending: Vec<CircuitBreakerEvent>,
}

impl Circuit {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_state_change: now,
            probe_in_flight: false,
            pending: Vec::new(),
        }
    }

    /// Takes the events raised since the last call.
    pub(crate) fn take_events(&mut self) -> Vec<CircuitBreakerEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Applies the OPEN -> HALF_OPEN timeout and returns the resulting state.
    pub(crate) fn refresh(
        &mut self,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) -> CircuitState {
        if self.state == CircuitState::Open && self.open_elapsed(config) {
            self.transition_to(CircuitState::HalfOpen, resource, config, atomic);
        }
        self.state
    }

    fn open_elapsed(&self, config: &CircuitBreakerConfig) -> bool {
        match self.last_failure_time {
            Some(at) => config.clock.now().saturating_duration_since(at) >= config.reset_timeout,
            None => true,
        }
    }

    /// Remaining time before an OPEN circuit admits a probe.
    pub(crate) fn retry_after(&self, config: &CircuitBreakerConfig) -> Duration {
        match (self.state, self.last_failure_time) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = config.clock.now().saturating_duration_since(at);
                config.reset_timeout.saturating_sub(elapsed)
            }
            // HALF_OPEN with the probe slot taken: the probe decides soon,
            // but a failed probe restarts the full timeout.
            (CircuitState::HalfOpen, _) if self.probe_in_flight => config.reset_timeout,
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn try_acquire(
        &mut self,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) -> Result<Admission, Duration> {
        let admission = match self.refresh(resource, config, atomic) {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::HalfOpen if !self.probe_in_flight => {
                self.probe_in_flight = true;
                Some(Admission::Probe)
            }
            CircuitState::HalfOpen | CircuitState::Open => None,
        };

        match admission {
            Some(admission) => {
                self.pending.push(CircuitBreakerEvent::CallPermitted {
                    resource: resource.to_string(),
                    timestamp: std::time::Instant::now(),
                    state: self.state,
                    probe: admission == Admission::Probe,
                });
                Ok(admission)
            }
            None => {
                let retry_after = self.retry_after(config);
                self.pending.push(CircuitBreakerEvent::CallRejected {
                    resource: resource.to_string(),
                    timestamp: std::time::Instant::now(),
                    retry_after,
                });

                #[cfg(feature = "metrics")]
                counter!("storage_circuit_calls_total", "resource" => resource.to_string(), "outcome" => "rejected")
                    .increment(1);

                Err(retry_after)
            }
        }
    }

    pub(crate) fn record_success(
        &mut self,
        admission: Admission,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) {
        self.pending.push(CircuitBreakerEvent::SuccessRecorded {
            resource: resource.to_string(),
            timestamp: std::time::Instant::now(),
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        counter!("storage_circuit_calls_total", "resource" => resource.to_string(), "outcome" => "success")
            .increment(1);

        match (admission, self.state) {
            (Admission::Probe, CircuitState::HalfOpen) => {
                self.transition_to(CircuitState::Closed, resource, config, atomic);
            }
            (Admission::Normal, CircuitState::Closed) => {
                self.failure_count = 0;
            }
            // A call admitted before the circuit tripped says nothing about now.
            _ => {}
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        admission: Admission,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) {
        if admission == Admission::Normal && self.state == CircuitState::Closed {
            self.failure_count = self.failure_count.saturating_add(1);
        }

        self.pending.push(CircuitBreakerEvent::FailureRecorded {
            resource: resource.to_string(),
            timestamp: std::time::Instant::now(),
            state: self.state,
            failure_count: self.failure_count,
        });

        #[cfg(feature = "metrics")]
        counter!("storage_circuit_calls_total", "resource" => resource.to_string(), "outcome" => "failure")
            .increment(1);

        match (admission, self.state) {
            (Admission::Probe, CircuitState::HalfOpen) => {
                self.transition_to(CircuitState::Open, resource, config, atomic);
            }
            (Admission::Normal, CircuitState::Closed)
                if self.failure_count >= config.failure_threshold =>
            {
                self.transition_to(CircuitState::Open, resource, config, atomic);
            }
            _ => {}
        }
    }

    /// Gives back a probe slot without judging the resource.
    pub(crate) fn release(&mut self, admission: Admission) {
        if admission == Admission::Probe && self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
        }
    }

    pub(crate) fn force(
        &mut self,
        state: CircuitState,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) {
        self.transition_to(state, resource, config, atomic);
        // Forcing CLOSED on a closed circuit still clears the counters.
        self.failure_count = 0;
    }

    pub(crate) fn metrics(&self, config: &CircuitBreakerConfig) -> CircuitMetrics {
        CircuitMetrics {
            state: self.state,
            failure_count: self.failure_count,
            last_failure_time: self.last_failure_time,
            probe_in_flight: self.probe_in_flight,
            time_since_state_change: config
                .clock
                .now()
                .saturating_duration_since(self.last_state_change),
        }
    }

    fn transition_to(
        &mut self,
        state: CircuitState,
        resource: &str,
        config: &CircuitBreakerConfig,
        atomic: &AtomicU8,
    ) {
        if self.state == state {
            return;
        }

        let from_state = self.state;
        let now = config.clock.now();

        self.state = state;
        atomic.store(state as u8, Ordering::Release);
        self.last_state_change = now;
        self.probe_in_flight = false;
        match state {
            CircuitState::Open => {
                self.last_failure_time = Some(now);
            }
            CircuitState::Closed => {
                self.failure_count = 0;
                self.last_failure_time = None;
            }
            CircuitState::HalfOpen => {}
        }

        tracing::info!(resource, from = %from_state, to = %state, "circuit state transition");

        #[cfg(feature = "metrics")]
        counter!(
            "storage_circuit_transitions_total",
            "resource" => resource.to_string(),
            "from" => from_state.as_str(),
            "to" => state.as_str()
        )
        .increment(1);

        self.pending.push(CircuitBreakerEvent::StateTransition {
            resource: resource.to_string(),
            timestamp: std::time::Instant::now(),
            from_state,
            to_state: state,
        });
    }
}
