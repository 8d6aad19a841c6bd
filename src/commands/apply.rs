//! `cascade apply` - submit declarations in dependency order

use anyhow::Result;
use colored::Colorize;
use declarative::{ExecuteSummary, SubmissionReport, execute};
use std::process::ExitCode;
use std::time::Instant;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::BarProgress;
use crate::signal::{self, INTERRUPTED_EXIT};
use crate::ui;

use super::Backend;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<ExitCode> {
    let (manifest, plan) = super::load_plan(ctx, &args.manifest)?;
    let backend = Backend::connect(ctx, &manifest)?;
    let opts = ctx.settings.execute_options(args.jobs);

    if !ctx.quiet {
        ui::header("Apply");
        ui::kv("Target", &backend.describe());
        ui::kv("Resources", &plan.len().to_string());
        ui::kv("Jobs", &opts.jobs.to_string());
    }

    if !args.yes && !confirm_proceed(plan.len())? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = signal::cancel_on_interrupt();
    let progress = BarProgress::new(ctx.quiet);
    let started = Instant::now();

    let report = execute(&plan, backend.api(), &opts, &progress, &cancel);
    let summary = report.summary();
    progress.finish(
        &summary,
        &format!(
            "Submitted {} in {}",
            ui::plural(summary.total(), "resource"),
            termkit::human_duration(started.elapsed())
        ),
    );

    if let Err(e) = backend.persist() {
        ui::warn(&format!("Could not save simulated cluster: {e:#}"));
    }

    print_report(&report);
    print_summary(&summary);
    Ok(exit_code(&report))
}

/// 0 on full success, 130 when interrupted, 1 for any failure
fn exit_code(report: &SubmissionReport) -> ExitCode {
    if report.was_cancelled() {
        ExitCode::from(INTERRUPTED_EXIT)
    } else if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Confirm with user
fn confirm_proceed(count: usize) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(format!("Submit {}?", ui::plural(count, "resource")))
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_report(report: &SubmissionReport) {
    println!();
    ui::outcome_table(report.outcomes()).print();

    let mut advice: Vec<&str> = report
        .outcomes()
        .iter()
        .filter_map(|o| match &o.result {
            declarative::SubmissionResult::Failed { category, .. } => Some(category.advice()),
            _ => None,
        })
        .collect();
    advice.sort_unstable();
    advice.dedup();
    for hint in advice {
        ui::dim(hint);
    }
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} {} accepted, {} updated, {} unchanged",
            "✓".green().bold(),
            summary.accepted,
            summary.updated,
            summary.unchanged
        );
    } else {
        println!(
            "  {} {} accepted, {} updated, {} unchanged, {} failed, {} blocked, {} cancelled",
            "✗".red().bold(),
            summary.accepted,
            summary.updated,
            summary.unchanged,
            summary.failed.to_string().red(),
            summary.blocked.to_string().red(),
            summary.cancelled.to_string().yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ManifestArgs;
    use crate::commands::tests::context;
    use clusterkit::MemoryCluster;
    use declarative::{ApiError, CancelToken, NoProgress, ResourceId, RetryConfig, SubmissionResult};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    const NFS: &str = r#"
[[resource]]
kind = "Service"
name = "nfs-provisioner"
spec = { ports = [{ name = "nfs", port = 2049 }] }

[[resource]]
kind = "Pod"
name = "nfs-server"
spec = { containers = [{ name = "nginx", image = "nginx", env = [{ name = "NFS_SERVER", value = { "$ref" = "Service/nfs-provisioner#spec.clusterIP" } }] }] }
"#;

    fn plan(dir: &TempDir) -> declarative::ExecutionPlan {
        let file = dir.path().join("nfs.toml");
        fs::write(&file, NFS).unwrap();
        let args = ManifestArgs {
            files: vec![file],
            targets: Vec::new(),
        };
        crate::commands::load_plan(&context(None), &args).unwrap().1
    }

    fn run_against(
        cluster: &Arc<MemoryCluster>,
        plan: &declarative::ExecutionPlan,
        cancel: &CancelToken,
    ) -> SubmissionReport {
        let mut opts = context(None).settings.execute_options(None);
        opts.retry = RetryConfig::no_retry();
        execute(plan, cluster.clone(), &opts, &NoProgress, cancel)
    }

    #[test]
    fn test_cluster_ip_flows_into_pod() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir);
        let cluster = Arc::new(MemoryCluster::new());

        let report = run_against(&cluster, &plan, &CancelToken::new());
        assert_eq!(exit_code(&report), ExitCode::SUCCESS);

        let service = cluster
            .object(&ResourceId::namespaced("Service", "default", "nfs-provisioner"))
            .unwrap();
        let pod = cluster
            .object(&ResourceId::namespaced("Pod", "default", "nfs-server"))
            .unwrap();
        assert_eq!(
            pod["spec"]["containers"][0]["env"][0]["value"],
            service["spec"]["clusterIP"]
        );
    }

    #[test]
    fn test_demo_manifest_applies_then_settles() {
        let args = ManifestArgs {
            files: vec![PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/nfs-provisioner.toml")],
            targets: Vec::new(),
        };
        let plan = crate::commands::load_plan(&context(None), &args).unwrap().1;
        assert_eq!(plan.len(), 13);

        let cluster = Arc::new(MemoryCluster::new());
        let first = run_against(&cluster, &plan, &CancelToken::new());
        assert!(first.is_success());
        assert_eq!(first.summary().accepted, 13);

        let service = cluster
            .object(&ResourceId::namespaced("Service", "default", "nfs-provisioner"))
            .unwrap();
        let nginx = cluster
            .object(&ResourceId::namespaced("Pod", "default", "nginx"))
            .unwrap();
        assert_eq!(nginx["spec"]["volumes"][0]["nfs"]["server"], service["spec"]["clusterIP"]);

        let second = run_against(&cluster, &plan, &CancelToken::new());
        assert_eq!(second.summary().unchanged, 13);
        assert_eq!(exit_code(&second), ExitCode::SUCCESS);
    }

    #[test]
    fn test_failure_exit_code() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir);
        let cluster = Arc::new(MemoryCluster::new());
        cluster.fail_next(
            clusterkit::CallKind::Create,
            &ResourceId::namespaced("Service", "default", "nfs-provisioner"),
            ApiError::validation("port out of range"),
            1,
        );

        let report = run_against(&cluster, &plan, &CancelToken::new());
        assert_eq!(exit_code(&report), ExitCode::FAILURE);
        assert!(matches!(
            report.result(&ResourceId::namespaced("Pod", "default", "nfs-server")),
            Some(SubmissionResult::BlockedByDependency { .. })
        ));
    }

    #[test]
    fn test_cancelled_exit_code() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir);
        let cluster = Arc::new(MemoryCluster::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_against(&cluster, &plan, &cancel);
        assert_eq!(exit_code(&report), ExitCode::from(INTERRUPTED_EXIT));
        assert_eq!(cluster.mutation_count(), 0);
    }
}
