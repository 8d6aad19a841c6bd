//! Terminal output for cascade, on top of termkit

use colored::{ColoredString, Colorize};
use declarative::{Outcome, SubmissionResult};

pub use termkit::{Table, dim, error, header, info, kv, plural, section, success, truncate, warn};

/// Result label colored by outcome
pub fn result_label(result: &SubmissionResult) -> ColoredString {
    let label = result.label();
    match result {
        SubmissionResult::Accepted => label.green(),
        SubmissionResult::Updated => label.yellow(),
        SubmissionResult::Unchanged => label.dimmed(),
        SubmissionResult::Failed { .. } => label.red().bold(),
        SubmissionResult::BlockedByDependency { .. } => label.red(),
        SubmissionResult::Cancelled => label.yellow().dimmed(),
    }
}

/// Detail column for the outcome table
pub fn result_detail(outcome: &Outcome) -> String {
    match &outcome.result {
        SubmissionResult::Failed {
            category, reason, ..
        } => format!("{}: {}", category.label(), truncate(reason, 80)),
        SubmissionResult::BlockedByDependency { dependency } => format!("waiting on {dependency}"),
        SubmissionResult::Cancelled => "interrupted before submission".to_string(),
        _ if outcome.attempts > 1 => format!("after {} attempts", outcome.attempts),
        _ => String::new(),
    }
}

/// Rows of the per-resource outcome table
pub fn outcome_table(outcomes: &[Outcome]) -> Table {
    let mut table = Table::new(["KIND", "NAMESPACE", "NAME", "RESULT", "ATTEMPTS", "DETAIL"]);
    for outcome in outcomes {
        table.row([
            outcome.id.kind.clone(),
            outcome.id.namespace.clone().unwrap_or_else(|| "-".to_string()),
            outcome.id.name.clone(),
            result_label(&outcome.result).to_string(),
            outcome.attempts.to_string(),
            result_detail(outcome),
        ]);
    }
    table
}
