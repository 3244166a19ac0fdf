//! Caller-facing results.
//!
//! Callers never see raw storage messages: every [`Outcome`] maps onto a
//! fixed [`ResponseCode`] and message, plus an optional retry hint.

use std::fmt;
use std::time::Duration;
use storage_resilience_core::{ErrorCategory, Outcome};

/// Stable result codes handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResponseCode {
    /// The operation succeeded (possibly with stale data).
    Ok,
    /// The resource is unavailable; try again later.
    ServiceUnavailable,
    /// The requested record does not exist.
    NotFound,
    /// The request conflicts with existing data.
    Conflict,
    /// The transaction lost a race; run it again.
    RetryTransaction,
    /// The request itself is invalid.
    InvalidRequest,
    /// Something unexpected went wrong.
    InternalError,
    /// The caller cancelled the request.
    Cancelled,
}

impl ResponseCode {
    /// Every code, in declaration order.
    pub const ALL: [ResponseCode; 8] = [
        ResponseCode::Ok,
        ResponseCode::ServiceUnavailable,
        ResponseCode::NotFound,
        ResponseCode::Conflict,
        ResponseCode::RetryTransaction,
        ResponseCode::InvalidRequest,
        ResponseCode::InternalError,
        ResponseCode::Cancelled,
    ];

    /// The HTTP status a web handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ResponseCode::Ok => 200,
            ResponseCode::ServiceUnavailable => 503,
            ResponseCode::NotFound => 404,
            ResponseCode::Conflict | ResponseCode::RetryTransaction => 409,
            ResponseCode::InvalidRequest => 400,
            ResponseCode::InternalError => 500,
            ResponseCode::Cancelled => 499,
        }
    }

    /// Snake-case name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Ok => "ok",
            ResponseCode::ServiceUnavailable => "service_unavailable",
            ResponseCode::NotFound => "not_found",
            ResponseCode::Conflict => "conflict",
            ResponseCode::RetryTransaction => "retry_transaction",
            ResponseCode::InvalidRequest => "invalid_request",
            ResponseCode::InternalError => "internal_error",
            ResponseCode::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller was trying to do. Changes the wording only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OperationKind {
    /// A read.
    #[default]
    Read,
    /// A write; unavailability means the change was not applied.
    Write,
}

/// The result shape callers see.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CallerResult {
    /// Stable result code.
    pub code: ResponseCode,
    /// Fixed human-readable message; never a raw storage error.
    pub message: &'static str,
    /// Suggested wait before trying again.
    pub retry_after: Option<Duration>,
    /// The data came from a fallback source and may be out of date.
    pub stale: bool,
}

impl CallerResult {
    fn new(code: ResponseCode, message: &'static str) -> Self {
        Self {
            code,
            message,
            retry_after: None,
            stale: false,
        }
    }

    /// Whether the caller got data.
    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::Ok
    }
}

/// Maps outcomes to caller results.
///
/// `reset_timeout` is the hint attached to unavailability failures; it
/// should be the circuit breaker's reset timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMapper {
    reset_timeout: Duration,
}

impl ResponseMapper {
    /// Creates a mapper suggesting `reset_timeout` as the retry hint.
    pub fn new(reset_timeout: Duration) -> Self {
        Self { reset_timeout }
    }

    /// Maps `outcome` for an operation of the given kind.
    pub fn to_caller_result<T>(&self, outcome: &Outcome<T>, kind: OperationKind) -> CallerResult {
        match outcome {
            Outcome::Success(_) => CallerResult::new(ResponseCode::Ok, "ok"),
            Outcome::Degraded { stale, .. } => CallerResult {
                stale: *stale,
                ..CallerResult::new(
                    ResponseCode::Ok,
                    if *stale { "ok, showing saved data" } else { "ok" },
                )
            },
            Outcome::CircuitOpen { retry_after, .. } => CallerResult {
                retry_after: Some(*retry_after),
                ..unavailable(kind)
            },
            Outcome::Cancelled => CallerResult::new(ResponseCode::Cancelled, "request cancelled"),
            Outcome::Failure(classification) => match classification.category {
                ErrorCategory::Connection | ErrorCategory::Resource | ErrorCategory::Operational => {
                    CallerResult {
                        retry_after: Some(self.reset_timeout),
                        ..unavailable(kind)
                    }
                }
                ErrorCategory::Query if classification.message_contains("does not exist") => {
                    CallerResult::new(ResponseCode::NotFound, "not found")
                }
                ErrorCategory::Query
                    if classification.message_contains("violates unique constraint") =>
                {
                    CallerResult::new(ResponseCode::Conflict, "conflict")
                }
                ErrorCategory::Query => {
                    CallerResult::new(ResponseCode::InvalidRequest, "invalid request")
                }
                ErrorCategory::Transaction => CallerResult::new(
                    ResponseCode::RetryTransaction,
                    "conflict, retry the transaction",
                ),
                ErrorCategory::Unknown => {
                    CallerResult::new(ResponseCode::InternalError, "internal error")
                }
            },
        }
    }
}

impl Default for ResponseMapper {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn unavailable(kind: OperationKind) -> CallerResult {
    let message = match kind {
        OperationKind::Read => "service unavailable",
        OperationKind::Write => "service unavailable, the change was not applied",
    };
    CallerResult::new(ResponseCode::ServiceUnavailable, message)
}
