//! `cascade plan` - show submission order without contacting the server

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use crate::Context;
use crate::cli::ManifestArgs;
use crate::ui;
use declarative::ExecutionPlan;

pub fn run(ctx: &Context, args: &ManifestArgs) -> Result<ExitCode> {
    let (_, plan) = super::load_plan(ctx, args)?;

    ui::header("Submission Plan");
    println!();
    plan_table(&plan, ctx.verbose > 0).print();

    let ranks = plan.ranks();
    println!();
    ui::kv("Resources", &plan.len().to_string());
    ui::kv("Ranks", &ranks.len().to_string());
    if let Some(widest) = ranks.iter().map(Vec::len).max().filter(|w| *w > 1) {
        ui::dim(&format!(
            "Up to {} resources can be submitted in parallel (--jobs)",
            widest.to_string().bold()
        ));
    }
    Ok(ExitCode::SUCCESS)
}

fn plan_table(plan: &ExecutionPlan, show_references: bool) -> ui::Table {
    let headers = if show_references {
        vec!["#", "RANK", "RESOURCE", "DEPENDS ON", "REFERENCES"]
    } else {
        vec!["#", "RANK", "RESOURCE", "DEPENDS ON"]
    };
    let mut table = ui::Table::new(headers);

    for (pos, node) in plan.nodes().iter().enumerate() {
        let deps = node
            .dependencies
            .iter()
            .map(|&d| plan.nodes()[d].id().to_string())
            .collect::<Vec<_>>();
        let deps = if deps.is_empty() {
            "-".dimmed().to_string()
        } else {
            deps.join(", ")
        };

        let mut row = vec![
            (pos + 1).to_string(),
            node.rank.to_string(),
            node.id().to_string(),
            deps,
        ];
        if show_references {
            let refs = node
                .declaration
                .references()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            row.push(refs);
        }
        table.row(row);
    }
    table
}
