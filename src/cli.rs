use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(version)]
#[command(about = "Submit dependent resource declarations to a cluster API in order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: ~/.config/cascade/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API server URL
    #[arg(long, global = true, env = "CASCADE_SERVER")]
    pub server: Option<String>,

    /// Bearer token for the API server
    #[arg(long, global = true, env = "CASCADE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Namespace for resources that do not name one
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Override a manifest variable (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub set: Vec<(String, String)>,

    /// Run against a simulated cluster stored in FILE instead of a server
    #[arg(long, global = true, value_name = "FILE")]
    pub simulate: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the submission order without contacting the server
    Plan(ManifestArgs),

    /// Check manifests for errors (bad references, cycles, unknown kinds)
    Validate(ManifestArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Submit declarations in dependency order
    Apply(ApplyArgs),

    /// Show effective settings
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Manifest file or directory (repeatable)
    #[arg(short, long = "file", value_name = "PATH", required = true)]
    pub files: Vec<PathBuf>,

    /// Only these resources and their dependencies (Kind or Kind.name)
    #[arg(short, long = "target", value_name = "TARGET")]
    pub targets: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Print a full unified diff of live and desired objects
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parallel submissions within a dependency rank (default from settings)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "cascade", "apply", "-f", "a.toml", "-f", "dir", "--target", "Deployment", "-y", "-j", "4",
            "--set", "size=5Gi",
        ])
        .unwrap();
        assert_eq!(cli.set, vec![("size".to_string(), "5Gi".to_string())]);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.manifest.files.len(), 2);
        assert_eq!(args.manifest.targets, vec!["Deployment"]);
        assert!(args.yes);
        assert_eq!(args.jobs, Some(4));
    }

    #[test]
    fn test_file_required() {
        assert!(Cli::try_parse_from(["cascade", "plan"]).is_err());
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(parse_key_val("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}
