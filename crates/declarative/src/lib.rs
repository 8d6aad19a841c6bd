//! # Declarative
//!
//! Dependency-aware submission of declared resources to a remote store.
//!
//! Declarations may point at fields of other declarations' realized
//! objects. The planner turns those references into a dependency graph and
//! a deterministic order; the executor then submits each declaration
//! idempotently, retrying transient failures and skipping anything whose
//! dependencies did not succeed.
//!
//! ## Core Concepts
//!
//! - **ResourceDeclaration**: desired state of one resource, possibly with `$ref` markers
//! - **FieldReference**: "this field takes its value from that field of another resource"
//! - **ExecutionPlan**: declarations in dependency order, grouped into ranks
//! - **SubmissionResult**: per-declaration outcome of a run
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ResourceDeclaration, ResourceId, submit_simple};
//! use serde_json::json;
//!
//! let claim = ResourceDeclaration::new(
//!     ResourceId::namespaced("PersistentVolumeClaim", "default", "data"),
//!     "v1",
//!     json!({"spec": {"resources": {"requests": {"storage": "1Mi"}}}})
//!         .as_object().cloned().unwrap_or_default(),
//! )?;
//! let pod = ResourceDeclaration::new(
//!     ResourceId::namespaced("Pod", "default", "app"),
//!     "v1",
//!     json!({"spec": {"volumes": [{"name": "data", "persistentVolumeClaim": {
//!         "claimName": {"$ref": "PersistentVolumeClaim/data"}
//!     }}]}})
//!     .as_object().cloned().unwrap_or_default(),
//! )?;
//!
//! let report = submit_simple(vec![pod, claim], api)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ResourceApi`]: the remote system (a REST client, an in-memory cluster)
//! - [`ProgressCallback`]: receives progress updates, possibly from worker threads
//!
//! Cancellation is cooperative through [`CancelToken`].

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod retry;
pub mod types;

#[cfg(test)]
mod fake;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback, ResourceApi};
pub use diff::{ChangeKind, DiffSummary, FieldDrift, ResourceDiff, group_by_kind, preview};
pub use error::{ApiError, ErrorCategory, PlanError};
pub use executor::{Outcome, SubmissionReport, execute, submit, submit_simple};
pub use planner::{ExecutionPlan, PlanNode};
pub use resource::{FieldPath, FieldReference, ResourceDeclaration};
pub use types::{ExecuteOptions, ExecuteSummary, ResourceId, RetryConfig, SubmissionResult};
