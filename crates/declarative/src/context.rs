//! Provider traits and run context
//!
//! These traits allow the declarative crate to be used without depending
//! on a specific cluster client, UI framework, or signal handling.

use crate::error::ApiError;
use crate::types::{ResourceId, SubmissionResult};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The external system that stores realized resources.
///
/// Implementations must be safe to call from several threads at once; the
/// remote system is the sole arbiter of conflicting writes.
pub trait ResourceApi: Send + Sync {
    /// Read the live object, `Ok(None)` when it does not exist
    fn get(&self, id: &ResourceId) -> Result<Option<Value>, ApiError>;

    /// Create the object and return what the server stored
    fn create(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError>;

    /// Replace the object and return what the server stored
    fn update(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError>;
}

impl<T: ResourceApi + ?Sized> ResourceApi for Arc<T> {
    fn get(&self, id: &ResourceId) -> Result<Option<Value>, ApiError> {
        (**self).get(id)
    }

    fn create(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError> {
        (**self).create(id, object)
    }

    fn update(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError> {
        (**self).update(id, object)
    }
}

/// Progress callback for submission runs
///
/// Called from worker threads when `jobs > 1`, hence `&self` and `Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first submission
    fn on_start(&self, total: usize);

    /// Called when starting to submit a single declaration
    fn on_resource_start(&self, id: &ResourceId);

    /// Called before sleeping ahead of a retry
    fn on_retry(&self, id: &ResourceId, attempt: u32, max_attempts: u32, error: &ApiError, delay: Duration);

    /// Called when a declaration reaches its final outcome
    fn on_resource_complete(&self, id: &ResourceId, result: &SubmissionResult);

    /// Called once after the last outcome
    fn on_finish(&self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&self, _total: usize) {}
    fn on_resource_start(&self, _id: &ResourceId) {}
    fn on_retry(&self, _id: &ResourceId, _attempt: u32, _max: u32, _error: &ApiError, _delay: Duration) {}
    fn on_resource_complete(&self, _id: &ResourceId, _result: &SubmissionResult) {}
    fn on_finish(&self) {}
}

/// Cooperative cancellation flag shared between the runner and whoever
/// handles interrupts.
///
/// Cancelling stops new submissions; calls already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set from a signal handler
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
