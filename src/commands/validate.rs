//! `cascade validate` - load and resolve manifests, report problems

use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::cli::ManifestArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &ManifestArgs) -> Result<ExitCode> {
    let (manifest, plan) = super::load_plan(ctx, args)?;

    if !ctx.quiet {
        for source in &manifest.sources {
            ui::dim(&source.display().to_string());
        }
    }

    let references: usize = plan
        .nodes()
        .iter()
        .map(|n| n.declaration.references().len())
        .sum();
    let custom = manifest.custom_kinds();

    ui::success(&format!(
        "{} valid: {} across {} ranks, {}",
        ui::plural(manifest.sources.len(), "manifest"),
        ui::plural(plan.len(), "resource"),
        plan.ranks().len(),
        ui::plural(references, "reference")
    ));
    for kind in custom {
        ui::info(&format!(
            "{} is not a built-in kind; served at {}",
            kind.kind,
            kind.collection_path(None)
        ));
    }
    Ok(ExitCode::SUCCESS)
}
