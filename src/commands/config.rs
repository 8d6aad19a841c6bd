use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context) -> Result<ExitCode> {
    let settings = &ctx.settings;

    ui::header("Settings");
    println!();
    let file = &ctx.config_file;
    let state = if file.exists() { "" } else { " (not found, using defaults)" };
    ui::kv("Settings file", &format!("{}{state}", file.display()));
    if let Some(path) = &ctx.simulate {
        ui::kv("Simulated cluster", &path.display().to_string());
    } else {
        ui::kv("Server", &settings.server);
    }
    ui::kv("Namespace", &settings.namespace);

    let token = match (settings.masked_token(), &settings.token_file) {
        (Some(masked), _) => masked,
        (None, Some(file)) => format!("from {}", paths::expand(file).display()),
        (None, None) => "(none)".to_string(),
    };
    ui::kv("Token", &token);
    if settings.insecure {
        ui::kv("TLS", "verification disabled");
    }

    ui::section("Submission");
    ui::kv("Jobs", &settings.jobs.to_string());
    ui::kv(
        "Call timeout",
        &settings
            .call_timeout()
            .map_or_else(|| "disabled".to_string(), termkit::human_duration),
    );

    let retry = settings.retry_config();
    ui::kv("Max attempts", &retry.max_attempts.to_string());
    ui::kv(
        "Backoff",
        &format!(
            "{} x{} (max {})",
            termkit::human_duration(retry.base_delay),
            retry.backoff_factor,
            termkit::human_duration(retry.max_delay)
        ),
    );

    if !ctx.vars.is_empty() {
        ui::section("Variables");
        for (key, value) in &ctx.vars {
            ui::kv(key, &value.to_string());
        }
    }
    Ok(ExitCode::SUCCESS)
}
