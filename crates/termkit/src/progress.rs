//! Spinners and progress bars built on indicatif

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Create a progress bar for `len` items
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─"),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

/// A bar that draws nothing, for quiet runs
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}

/// Finish with a success mark
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.finish_with_message(format!("{} {}", "✓".green(), msg));
}

/// Finish with a warning mark
pub fn finish_warn(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.finish_with_message(format!("{} {}", "⚠".yellow(), msg));
}

/// Finish with an error mark
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.finish_with_message(format!("{} {}", "✗".red(), msg));
}

/// Remove the bar from the terminal
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
