//! Progress reporting for submission runs

use colored::Colorize;
use declarative::{ApiError, ExecuteSummary, ProgressCallback, ResourceId, SubmissionResult};
use indicatif::ProgressBar;
use std::time::Duration;

use termkit::format::human_duration;
use termkit::progress;

/// Drives a progress bar from the runner's callbacks.
///
/// Retries and failures are printed above the bar so they stay visible.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            progress::hidden()
        } else {
            progress::bar(0, "Submitting")
        };
        Self { bar }
    }

    /// Finish the bar with a mark matching the run's outcome
    pub fn finish(&self, summary: &ExecuteSummary, message: &str) {
        if summary.is_success() {
            progress::finish_success(&self.bar, message);
        } else if summary.failed + summary.blocked == 0 {
            progress::finish_warn(&self.bar, message);
        } else {
            progress::finish_error(&self.bar, message);
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_resource_start(&self, id: &ResourceId) {
        self.bar.set_message(id.to_string());
    }

    fn on_retry(&self, id: &ResourceId, attempt: u32, max_attempts: u32, error: &ApiError, delay: Duration) {
        self.bar.println(format!(
            "  {} {} attempt {}/{} failed ({}), retrying in {}",
            "↻".yellow(),
            id,
            attempt,
            max_attempts,
            error.category,
            human_duration(delay)
        ));
    }

    fn on_resource_complete(&self, id: &ResourceId, result: &SubmissionResult) {
        if let SubmissionResult::Failed { reason, .. } = result {
            self.bar.println(format!("  {} {}: {}", "✗".red(), id, reason));
        }
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.set_message("");
    }
}
