//! Core types for declarative resource submission

use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of a resource: kind, optional namespace, name.
///
/// Cluster-scoped kinds carry no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    /// Create an identity with an optional namespace
    pub fn new(kind: impl Into<String>, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Identity of a namespaced resource
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(kind, Some(namespace.into()), name)
    }

    /// Identity of a cluster-scoped resource
    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, None, name)
    }

    /// Parse `Kind/name` or `Kind/namespace/name`
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split('/').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [kind, name] => Some(Self::cluster(kind.trim(), name.trim())),
            [kind, ns, name] => Some(Self::namespaced(kind.trim(), ns.trim(), name.trim())),
            _ => None,
        }
    }

    /// Whether this identity matches a target filter.
    ///
    /// Target format: "Kind" or "Kind.name" (kind compared case-insensitively).
    pub fn matches_target(&self, target: &str) -> bool {
        let (kind, name) = match target.split_once('.') {
            Some((k, n)) => (k, Some(n)),
            None => (target, None),
        };
        if !self.kind.eq_ignore_ascii_case(kind) {
            return false;
        }
        name.is_none_or(|n| self.name == n)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Outcome of submitting one declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResult {
    /// Resource did not exist and was created
    Accepted,
    /// Resource already existed and matched the desired state
    Unchanged,
    /// Resource existed with a different state and was updated
    Updated,
    /// Submission failed permanently or exhausted its retries
    Failed { category: ErrorCategory, reason: String },
    /// Never attempted because a dependency did not succeed
    BlockedByDependency { dependency: ResourceId },
    /// Never attempted because the run was interrupted
    Cancelled,
}

impl SubmissionResult {
    /// Check if the result represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted | Self::Unchanged | Self::Updated)
    }

    /// Short label used in outcome tables
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Unchanged => "unchanged",
            Self::Updated => "updated",
            Self::Failed { .. } => "failed",
            Self::BlockedByDependency { .. } => "blocked",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Summary of submission results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub accepted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.accepted + self.updated
    }

    /// Every declaration reached accepted, updated, or unchanged
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0 && self.cancelled == 0
    }

    /// Total number of declarations processed
    pub fn total(&self) -> usize {
        self.accepted + self.updated + self.unchanged + self.failed + self.blocked + self.cancelled
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &SubmissionResult) {
        match result {
            SubmissionResult::Accepted => self.accepted += 1,
            SubmissionResult::Updated => self.updated += 1,
            SubmissionResult::Unchanged => self.unchanged += 1,
            SubmissionResult::Failed { .. } => self.failed += 1,
            SubmissionResult::BlockedByDependency { .. } => self.blocked += 1,
            SubmissionResult::Cancelled => self.cancelled += 1,
        }
    }
}

/// Retry configuration for transient API failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for a submission run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of parallel jobs within one dependency rank (1 = sequential)
    pub jobs: usize,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// Per-call timeout; `None` lets calls block indefinitely
    pub call_timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            retry: RetryConfig::default(),
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}
