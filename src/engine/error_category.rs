// Error Categorizer: classifies an error message/type into one of nine
// categories using a first-match-wins ordered matcher list.
//
// Grounded in `original_source/core/recovery_system.py`'s ErrorCategorizer
// class.

//! # Error Categorizer
//!
//! The Recovery Manager and Retry Engine both need to know *what kind* of
//! failure they're looking at before deciding what to do about it. This
//! module is the single place that turns an error into one of nine
//! categories; everything downstream (recovery strategy selection, retry
//! eligibility) keys off the category, never off raw error text.

use serde::{Deserialize, Serialize};

/// One of nine failure categories. Order here matches the matcher order in
/// [`ErrorCategorizer::categorize`]: first matcher to match wins, exactly
/// as the Python reference's `ErrorCategorizer` iterates its rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Likely to succeed if retried as-is: network blips, momentary
    /// unavailability.
    Transient,
    /// The workflow's own state is inconsistent with what the step
    /// expected.
    StateInvalid,
    /// A required resource (memory, disk, connection pool) was exhausted.
    Resource,
    /// A dependency (external service, downstream step) failed or is
    /// unreachable.
    Dependency,
    /// A logic/assertion failure in step code; retrying won't help.
    Logical,
    /// An authentication/authorization/security violation.
    Security,
    /// A permission check failed (distinct from full security rejection).
    Permission,
    /// The step exceeded its allotted time budget.
    Timeout,
    /// Didn't match any known pattern.
    Unknown,
}

impl ErrorCategory {
    /// Whether this category is, in general, worth retrying without
    /// operator intervention. Used as the Retry Engine's default
    /// retryable-error predicate.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorCategory::Transient
                | ErrorCategory::Resource
                | ErrorCategory::Dependency
                | ErrorCategory::Timeout
        )
    }
}

/// One ordered matcher: if `pattern` is found (case-insensitively) in the
/// error message, or `type_name` matches the error's type tag, the error is
/// classified as `category`.
struct Matcher {
    category: ErrorCategory,
    message_patterns: &'static [&'static str],
    type_names: &'static [&'static str],
}

const MATCHERS: &[Matcher] = &[
    Matcher {
        category: ErrorCategory::Timeout,
        message_patterns: &["timed out", "timeout", "deadline exceeded"],
        type_names: &["TimeoutError", "ElapsedError"],
    },
    Matcher {
        category: ErrorCategory::Security,
        message_patterns: &["unauthorized", "authentication failed", "invalid credentials", "forbidden"],
        type_names: &["AuthenticationError", "SecurityError"],
    },
    Matcher {
        category: ErrorCategory::Permission,
        message_patterns: &["permission denied", "access denied", "not permitted"],
        type_names: &["PermissionError"],
    },
    Matcher {
        category: ErrorCategory::Resource,
        message_patterns: &["out of memory", "resource exhausted", "too many open", "quota exceeded", "no space left"],
        type_names: &["ResourceExhaustedError", "MemoryError"],
    },
    Matcher {
        category: ErrorCategory::Dependency,
        message_patterns: &["connection refused", "connection reset", "service unavailable", "upstream", "dns"],
        type_names: &["ConnectionError", "DependencyError"],
    },
    Matcher {
        category: ErrorCategory::Transient,
        message_patterns: &["temporarily unavailable", "try again", "rate limited", "too many requests"],
        type_names: &["TransientError"],
    },
    Matcher {
        category: ErrorCategory::StateInvalid,
        message_patterns: &["invalid state", "inconsistent state", "unexpected state"],
        type_names: &["StateError", "InvalidStateError"],
    },
    Matcher {
        category: ErrorCategory::Logical,
        message_patterns: &["assertion failed", "invariant violated", "logic error"],
        type_names: &["AssertionError", "LogicError"],
    },
];

/// Classifies errors by message/type against a fixed, ordered matcher
/// list. Stateless: a single instance can be shared (or cheaply
/// constructed per call) across the whole runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCategorizer;

impl ErrorCategorizer {
    pub fn new() -> Self {
        ErrorCategorizer
    }

    /// Categorize an error given its display message and, if known, a type
    /// tag (the Rust analogue of a Python exception class name).
    pub fn categorize(&self, message: &str, type_name: Option<&str>) -> ErrorCategory {
        let lower = message.to_lowercase();
        for matcher in MATCHERS {
            if matcher
                .message_patterns
                .iter()
                .any(|pattern| lower.contains(pattern))
            {
                return matcher.category;
            }
            if let Some(type_name) = type_name {
                if matcher.type_names.contains(&type_name) {
                    return matcher.category;
                }
            }
        }
        ErrorCategory::Unknown
    }
}
