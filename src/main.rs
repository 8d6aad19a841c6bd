mod cli;
mod commands;
mod config;
mod manifest;
mod paths;
mod progress;
mod signal;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use serde_json::{Map, Value};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use config::{Overrides, Settings};

/// Exit status for planning, configuration and manifest errors
const USAGE_EXIT: u8 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Location of the settings file
    pub config_file: PathBuf,
    /// Effective settings after command-line overrides
    pub settings: Settings,
    /// Manifest variables from `--set`
    pub vars: Map<String, Value>,
    /// Snapshot file of a simulated cluster
    pub simulate: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(USAGE_EXIT)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "cascade", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config_file = match cli.config {
        Some(path) => path,
        None => paths::config_file()?,
    };
    let mut settings = Settings::load(Some(&config_file))?;
    settings.apply(Overrides {
        server: cli.server,
        token: cli.token,
        namespace: cli.namespace,
    });
    settings.validate()?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_file,
        settings,
        vars: manifest::overrides(&cli.set),
        simulate: cli.simulate,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Validate(args) => commands::validate::run(&ctx, &args),
        Command::Diff(args) => commands::diff::run(&ctx, &args),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Config => commands::config::run(&ctx),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}
