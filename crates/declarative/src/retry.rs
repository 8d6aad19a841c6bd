//! Retry logic with exponential backoff for transient errors.

use crate::error::{ApiError, ErrorCategory};
use crate::types::RetryConfig;
use std::thread;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is about to be retried.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ApiError, delay: Duration);
}

/// Error returned once retrying has stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    pub error: ApiError,
    /// Attempts made, including the first
    pub attempts: u32,
}

/// Execute an operation with retry logic.
///
/// Retries the operation while it returns a retryable error, sleeping with
/// exponential backoff between attempts. Permanent errors return at once.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut() -> Result<T, ApiError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok((result, attempt)),
            Err(error) => {
                if !error.is_retryable() || attempt >= max_attempts {
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                    });
                }

                let delay = config.delay_for_attempt(attempt - 1);
                if let Some(cb) = callback {
                    cb.on_retry(attempt, max_attempts, &error, delay);
                }
                log::warn!(
                    "Attempt {}/{} failed ({}); retrying in {:?}",
                    attempt,
                    max_attempts,
                    error,
                    delay
                );

                thread::sleep(delay);
            }
        }
    }
}

impl RetryError {
    pub fn category(&self) -> ErrorCategory {
        self.error.category
    }
}
