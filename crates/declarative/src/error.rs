//! Error types for planning and submission.
//!
//! Errors are categorized so the retry logic can tell transient API
//! failures apart from permanent ones, and so planning problems can be
//! reported before anything is sent to the remote system.

use crate::types::ResourceId;
use thiserror::Error;

/// Categories of API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection reset, rate limiting, server-side errors
    Transient,
    /// The call did not answer within the per-call timeout
    Timeout,
    /// Optimistic concurrency conflict or "already exists" on create
    Conflict,
    /// The remote system rejected the object's schema
    Validation,
    /// Authentication or authorization denied
    Authorization,
    /// The target (or its namespace) does not exist
    NotFound,
    /// A field reference could not be resolved from realized state
    Reference,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout | Self::Conflict)
    }

    /// Short label used in outcome tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::NotFound => "not found",
            Self::Reference => "reference",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient | Self::Timeout => "Check connectivity to the API server and try again",
            Self::Conflict => "Another writer changed the resource; re-run to reconcile",
            Self::Validation => "Fix the declaration so the server accepts its schema",
            Self::Authorization => "Check the token and the RBAC permissions it carries",
            Self::NotFound => "Make sure the namespace or parent resource exists",
            Self::Reference => "Check the field path of the $ref against the realized object",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An error returned by a [`ResourceApi`](crate::ResourceApi) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{category} error: {message}")]
pub struct ApiError {
    /// Classification used for retry decisions
    pub category: ErrorCategory,
    /// Server or transport message
    pub message: String,
}

impl ApiError {
    /// Create an error with an explicit category.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Reference, message)
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

/// Errors detected while resolving a declaration set into a plan.
///
/// All of these are fatal and raised before any API call is issued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The reference graph contains a cycle
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    Cycle {
        /// The cycle, first element repeated at the end
        cycle: Vec<ResourceId>,
        /// Every declaration that could not be ordered
        unresolved: Vec<ResourceId>,
    },

    /// Two declarations share the same identity
    #[error("duplicate declaration: {0}")]
    Duplicate(ResourceId),

    /// A reference or depends_on entry points outside the declaration set
    #[error("{from} references {target}, which is not declared")]
    UnknownReference {
        /// The declaration holding the reference
        from: ResourceId,
        /// The identity that could not be found
        target: String,
    },

    /// A `$ref` value could not be parsed
    #[error("invalid reference {value:?}: {message}")]
    InvalidReference {
        /// The raw reference text
        value: String,
        /// What is wrong with it
        message: String,
    },
}

fn format_cycle(cycle: &[ResourceId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(ErrorCategory::Conflict.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Authorization.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Reference.is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::authorization("serviceaccounts is forbidden");
        assert_eq!(
            err.to_string(),
            "authorization error: serviceaccounts is forbidden"
        );
    }

    #[test]
    fn test_cycle_display_lists_full_cycle() {
        let a = ResourceId::namespaced("Pod", "default", "a");
        let b = ResourceId::namespaced("Pod", "default", "b");
        let err = PlanError::Cycle {
            cycle: vec![a.clone(), b.clone(), a.clone()],
            unresolved: vec![a, b],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle: Pod/default/a -> Pod/default/b -> Pod/default/a"
        );
    }
}
