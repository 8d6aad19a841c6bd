//! `cascade diff` - preview what apply would change

use anyhow::Result;
use colored::Colorize;
use declarative::{ChangeKind, DiffSummary, ResourceDiff, group_by_kind, preview};
use serde_json::Value;
use std::process::ExitCode;

use crate::Context;
use crate::cli::DiffArgs;
use crate::ui;

use super::Backend;

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<ExitCode> {
    let (manifest, plan) = super::load_plan(ctx, &args.manifest)?;
    let backend = Backend::connect(ctx, &manifest)?;
    log::info!("Comparing {} resources against {}", plan.len(), backend.describe());

    let api = backend.api();
    let spinner = if ctx.quiet {
        termkit::progress::hidden()
    } else {
        termkit::progress::spinner("Reading live state...")
    };
    let diffs = preview(&plan, api.as_ref());
    termkit::progress::finish_clear(&spinner);
    display_diff(&diffs);

    if args.full {
        for diff in diffs.iter().filter(|d| d.has_changes()) {
            println!();
            println!("{}", diff.id.to_string().bold());
            print!("{}", unified(diff));
        }
    }

    let summary = DiffSummary::from_diffs(&diffs);
    if summary.unknown > 0 {
        ui::warn(&format!(
            "Live state of {} could not be read",
            ui::plural(summary.unknown, "resource")
        ));
    }
    Ok(ExitCode::SUCCESS)
}

/// Display diffs grouped by kind
fn display_diff(diffs: &[ResourceDiff]) {
    let summary = DiffSummary::from_diffs(diffs);
    if !summary.has_changes() && summary.unknown == 0 {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", "Resource Diff".bold());
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", kind.bold());
        for diff in kind_diffs {
            let (symbol, note) = match &diff.change {
                ChangeKind::Create => ("+".green(), "(will create)".to_string()),
                ChangeKind::Update => ("~".yellow(), ui::plural(diff.drift.len(), "field")),
                ChangeKind::Unchanged => ("=".dimmed(), "(in sync)".to_string()),
                ChangeKind::Unknown { error } => ("?".red(), ui::truncate(error, 60)),
            };
            let name = match &diff.id.namespace {
                Some(ns) => format!("{ns}/{}", diff.id.name),
                None => diff.id.name.clone(),
            };
            println!("│   {} {:<30} {}", symbol, name, note.dimmed());

            for field in &diff.drift {
                let live = field.live.as_ref().map_or_else(|| "(unset)".to_string(), compact);
                println!(
                    "│       {}: {} → {}",
                    field.path,
                    ui::truncate(&live, 40).red(),
                    ui::truncate(&compact(&field.desired), 40).green()
                );
            }
            for pending in &diff.pending_references {
                println!("│       {} {}", pending.dimmed(), "(known after apply)".dimmed());
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} unchanged",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.unchanged.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Unified text diff of the live object against the desired one
fn unified(diff: &ResourceDiff) -> String {
    let live = diff.live.as_ref().map(pretty).unwrap_or_default();
    let desired = pretty(&diff.desired);
    similar::TextDiff::from_lines(&live, &desired)
        .unified_diff()
        .context_radius(3)
        .header("live", "desired")
        .to_string()
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}
