//! Command implementations and the pieces they share

pub mod apply;
pub mod config;
pub mod diff;
pub mod plan;
pub mod validate;

use anyhow::{Context as AnyhowContext, Result, bail};
use clusterkit::{MemoryCluster, RestClient, RestConfig};
use declarative::{ExecutionPlan, ResourceApi};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::ManifestArgs;
use crate::manifest::Manifest;

/// Request timeout when per-call timeouts are disabled
const FALLBACK_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Load manifests and resolve them into a plan restricted to `--target`
pub fn load_plan(ctx: &Context, args: &ManifestArgs) -> Result<(Manifest, ExecutionPlan)> {
    let manifest = Manifest::load(&args.files, &ctx.vars, &ctx.settings.namespace)?;
    if manifest.declarations.is_empty() {
        bail!("No resources declared in {}", describe_files(&args.files));
    }

    let plan = ExecutionPlan::resolve(manifest.declarations.clone())?;
    let unmatched = plan.unmatched_targets(&args.targets);
    if !unmatched.is_empty() {
        bail!("Target matches no resource: {}", unmatched.join(", "));
    }

    let plan = plan.select(&args.targets);
    log::debug!("Plan has {} resources", plan.len());
    Ok((manifest, plan))
}

fn describe_files(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where submissions go: a real API server or a simulated cluster on disk
pub enum Backend {
    Rest(Arc<RestClient>),
    Simulated {
        cluster: Arc<MemoryCluster>,
        path: PathBuf,
    },
}

impl Backend {
    pub fn connect(ctx: &Context, manifest: &Manifest) -> Result<Self> {
        if let Some(path) = &ctx.simulate {
            let cluster = MemoryCluster::load(path)?;
            log::info!("Simulating cluster from {}", path.display());
            return Ok(Self::Simulated {
                cluster: Arc::new(cluster),
                path: path.clone(),
            });
        }

        let settings = &ctx.settings;
        let config = RestConfig {
            server: settings.server.clone(),
            token: settings.resolve_token()?,
            insecure: settings.insecure,
            timeout: settings.call_timeout().unwrap_or(FALLBACK_REQUEST_TIMEOUT),
        };
        let mut client = RestClient::new(&config)
            .with_context(|| format!("Invalid server in settings: {}", settings.server))?;
        for kind in manifest.custom_kinds() {
            log::debug!("Registering kind {} ({})", kind.kind, kind.api_version);
            client = client.with_kind(kind);
        }
        Ok(Self::Rest(Arc::new(client)))
    }

    pub fn api(&self) -> Arc<dyn ResourceApi> {
        match self {
            Self::Rest(client) => Arc::clone(client) as Arc<dyn ResourceApi>,
            Self::Simulated { cluster, .. } => Arc::clone(cluster) as Arc<dyn ResourceApi>,
        }
    }

    /// Human-readable target of the run
    pub fn describe(&self) -> String {
        match self {
            Self::Rest(client) => client.server().to_string(),
            Self::Simulated { path, .. } => format!("simulated cluster {}", path.display()),
        }
    }

    /// Write simulated state back to its snapshot file
    pub fn persist(&self) -> Result<()> {
        if let Self::Simulated { cluster, path } = self {
            cluster.save(path)?;
            log::debug!("Saved simulated cluster to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::Map;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn context(simulate: Option<PathBuf>) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config_file: PathBuf::from("config.toml"),
            settings: Settings::default(),
            vars: Map::new(),
            simulate,
        }
    }

    const STACK: &str = r#"
[[resource]]
kind = "PersistentVolumeClaim"
name = "data"
spec = { accessModes = ["ReadWriteOnce"] }

[[resource]]
kind = "Deployment"
name = "app"
spec = { volumes = [{ claimName = { "$ref" = "PersistentVolumeClaim/data" } }] }

[[resource]]
kind = "ConfigMap"
name = "unrelated"
data = { a = "b" }
"#;

    fn manifest_args(dir: &TempDir, targets: &[&str]) -> ManifestArgs {
        let file = dir.path().join("stack.toml");
        fs::write(&file, STACK).unwrap();
        ManifestArgs {
            files: vec![file],
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    #[test]
    fn test_load_plan_with_target() {
        let dir = TempDir::new().unwrap();
        let ctx = context(None);

        let (_, plan) = load_plan(&ctx, &manifest_args(&dir, &[])).unwrap();
        assert_eq!(plan.len(), 3);

        let (_, plan) = load_plan(&ctx, &manifest_args(&dir, &["deployment"])).unwrap();
        let names: Vec<&str> = plan.order().iter().map(|id| id.name.as_str()).collect();
        assert_eq!(names, vec!["data", "app"]);
    }

    #[test]
    fn test_unmatched_target_is_error() {
        let dir = TempDir::new().unwrap();
        let err = load_plan(&context(None), &manifest_args(&dir, &["Secret"])).unwrap_err();
        assert!(err.to_string().contains("Secret"));
    }

    #[test]
    fn test_simulated_backend_persists() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("cluster.json");
        let ctx = context(Some(snapshot.clone()));

        let (manifest, plan) = load_plan(&ctx, &manifest_args(&dir, &[])).unwrap();
        let backend = Backend::connect(&ctx, &manifest).unwrap();
        let report = declarative::submit_simple(
            plan.nodes().iter().map(|n| n.declaration.clone()).collect(),
            backend.api(),
        )
        .unwrap();
        assert!(report.is_success());
        backend.persist().unwrap();

        let reloaded = MemoryCluster::load(&snapshot).unwrap();
        assert_eq!(reloaded.ids().len(), 3);
    }

    #[test]
    fn test_rest_backend_rejects_bad_server() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(None);
        ctx.settings.server = "localhost:6443".to_string();
        let (manifest, _) = load_plan(&ctx, &manifest_args(&dir, &[])).unwrap();
        assert!(Backend::connect(&ctx, &manifest).is_err());
    }
}
