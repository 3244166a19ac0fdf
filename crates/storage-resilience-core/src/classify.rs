//! Storage error taxonomy and message classification.
//!
//! The classifier looks only at the rendered error message. It lowercases the
//! message and walks an ordered rule table; the first rule that matches
//! decides both the [`ErrorCategory`] and whether the failure is worth
//! retrying. Anything the table does not recognise is [`ErrorCategory::Unknown`]
//! and never retried.
//!
//! ```rust
//! use storage_resilience_core::{classify, ErrorCategory};
//!
//! let c = classify("connect ECONNREFUSED 10.0.0.5:5432");
//! assert_eq!(c.category, ErrorCategory::Connection);
//! assert!(c.retryable);
//!
//! let c = classify("duplicate key value violates unique constraint \"users_email_key\"");
//! assert_eq!(c.category, ErrorCategory::Query);
//! assert!(!c.retryable);
//! ```

use std::fmt;

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorCategory {
    /// The resource could not be reached or the link dropped.
    Connection,
    /// The statement itself is wrong; retrying reproduces the failure.
    Query,
    /// Concurrency control aborted the work (deadlocks, serialization).
    Transaction,
    /// The resource ran out of memory, disk or connection slots.
    Resource,
    /// The resource is in a maintenance state (shutdown, recovery, read-only).
    Operational,
    /// Nothing in the rule table explains the message.
    Unknown,
}

impl ErrorCategory {
    /// Every category, in taxonomy order.
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::Connection,
        ErrorCategory::Query,
        ErrorCategory::Transaction,
        ErrorCategory::Resource,
        ErrorCategory::Operational,
        ErrorCategory::Unknown,
    ];

    /// Stable lowercase label, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Query => "query",
            ErrorCategory::Transaction => "transaction",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Operational => "operational",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict for one raw storage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorClassification {
    /// Taxonomy category.
    pub category: ErrorCategory,
    /// Whether repeating the same operation may succeed.
    pub retryable: bool,
    /// The original message, kept for logs. Never shown to callers.
    pub source_message: String,
}

impl ErrorClassification {
    /// Builds a classification directly, for failures synthesised by the
    /// resilience layer itself (timeouts, rejected calls).
    pub fn new(category: ErrorCategory, retryable: bool, source_message: impl Into<String>) -> Self {
        Self {
            category,
            retryable,
            source_message: source_message.into(),
        }
    }

    /// Returns true if the classified message contains `needle` (case-insensitive).
    pub fn message_contains(&self, needle: &str) -> bool {
        self.source_message
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

/// One row of the rule table.
struct Rule {
    category: ErrorCategory,
    retryable: bool,
    /// The rule fires when any of these phrases is present...
    any: &'static [&'static str],
    /// ...and, when non-empty, at least one of these as well.
    with: &'static [&'static str],
}

const CONNECTION_PHRASES: &[&str] = &[
    "connection refused",
    "econnrefused",
    "timed out",
    "etimedout",
    "connection reset",
    "econnreset",
    "terminated unexpectedly",
    "too many connections",
    "could not connect",
];

// Order matters: first match wins.
const RULES: &[Rule] = &[
    Rule {
        category: ErrorCategory::Connection,
        retryable: false,
        any: CONNECTION_PHRASES,
        with: &["ssl", "tls"],
    },
    Rule {
        category: ErrorCategory::Resource,
        retryable: true,
        any: &["too many connections already"],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Connection,
        retryable: true,
        any: CONNECTION_PHRASES,
        with: &[],
    },
    Rule {
        category: ErrorCategory::Transaction,
        retryable: true,
        any: &[
            "deadlock detected",
            "statement timeout",
            "could not serialize access",
        ],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Transaction,
        retryable: false,
        any: &["transaction is aborted"],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Query,
        retryable: false,
        any: &[
            "syntax error",
            "does not exist",
            "invalid input syntax",
            "value too long",
        ],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Query,
        retryable: false,
        any: &["violates"],
        with: &["constraint"],
    },
    Rule {
        category: ErrorCategory::Resource,
        retryable: true,
        any: &["out of memory", "out of shared memory"],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Resource,
        retryable: false,
        any: &["out of disk space", "no space left on device"],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Operational,
        retryable: true,
        any: &["shutting down", "recovery mode"],
        with: &[],
    },
    Rule {
        category: ErrorCategory::Operational,
        retryable: false,
        any: &["read-only transaction"],
        with: &[],
    },
];

impl Rule {
    fn matches(&self, message: &str) -> bool {
        self.any.iter().any(|p| message.contains(p))
            && (self.with.is_empty() || self.with.iter().any(|p| message.contains(p)))
    }
}

/// Classifies a raw storage error message.
///
/// Pure and total: every input yields a classification, and unmatched input
/// is `Unknown` / not retryable.
pub fn classify(message: &str) -> ErrorClassification {
    let lowered = message.to_lowercase();
    let (category, retryable) = RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| (rule.category, rule.retryable))
        .unwrap_or((ErrorCategory::Unknown, false));

    ErrorClassification {
        category,
        retryable,
        source_message: message.to_string(),
    }
}

/// Classifies any displayable error by its rendered message.
pub fn classify_error<E: fmt::Display + ?Sized>(error: &E) -> ErrorClassification {
    classify(&error.to_string())
}
