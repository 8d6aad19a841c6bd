//! Manifest loading: TOML or JSON files into resource declarations
//!
//! A manifest holds an optional `[vars]` table and a `[[resource]]` array.
//! Every string in a resource entry may use `${var}`; a string that is
//! exactly `${var}` takes the variable's value with its type, and `$${`
//! writes a literal `${`.

use anyhow::{Context, Result, bail};
use clusterkit::KindInfo;
use clusterkit::kinds::{default_api_version, is_namespaced};
use declarative::{ResourceDeclaration, ResourceId};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$\{|\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("placeholder pattern is valid")
});

static WHOLE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}$").expect("placeholder pattern is valid")
});

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    vars: Map<String, Value>,
    #[serde(default)]
    resource: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    kind: String,
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default, rename = "apiVersion")]
    api_version: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(flatten)]
    spec: Map<String, Value>,
}

/// Declarations loaded from one or more manifest files
#[derive(Debug, Default)]
pub struct Manifest {
    pub declarations: Vec<ResourceDeclaration>,
    /// Files read, in load order
    pub sources: Vec<PathBuf>,
}

impl Manifest {
    /// Load every manifest under `paths`, in order.
    ///
    /// `overrides` replace file variables; `namespace` is given to namespaced
    /// resources that do not name one.
    pub fn load(paths: &[PathBuf], overrides: &Map<String, Value>, namespace: &str) -> Result<Self> {
        let mut manifest = Self::default();
        for file in collect_files(paths)? {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Could not read manifest: {}", file.display()))?;
            let format = Format::of(&file);
            let declarations = parse(&content, format, overrides, namespace)
                .with_context(|| format!("Invalid manifest: {}", file.display()))?;
            log::debug!("Loaded {} resources from {}", declarations.len(), file.display());
            manifest.declarations.extend(declarations);
            manifest.sources.push(file);
        }
        Ok(manifest)
    }

    /// Kinds that are not built in, as declared by their `apiVersion`
    pub fn custom_kinds(&self) -> Vec<KindInfo> {
        let mut kinds: Vec<KindInfo> = Vec::new();
        for decl in &self.declarations {
            if KindInfo::builtin(&decl.id.kind).is_some() || kinds.iter().any(|k| k.kind == decl.id.kind) {
                continue;
            }
            if let Some(info) = KindInfo::resolve(&decl.id.kind, Some(&decl.api_version)) {
                kinds.push(info);
            }
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("toml" | "json")
    )
}

/// Expand directories into the manifest files beneath them, sorted by path
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.with_context(|| format!("Could not walk {}", path.display()))?;
                if entry.file_type().is_file() && is_manifest(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            if found.is_empty() {
                log::warn!("No manifest files under {}", path.display());
            }
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            bail!("Manifest not found: {}", path.display());
        }
    }
    Ok(files)
}

/// Parse one manifest document into declarations
pub fn parse(
    content: &str,
    format: Format,
    overrides: &Map<String, Value>,
    namespace: &str,
) -> Result<Vec<ResourceDeclaration>> {
    let file: ManifestFile = match format {
        Format::Toml => toml::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };

    let mut vars = file.vars;
    for (key, value) in overrides {
        vars.insert(key.clone(), value.clone());
    }

    file.resource
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let label = describe(&raw, i);
            let value = interpolate(&raw, &vars).with_context(|| format!("in {label}"))?;
            let entry: ResourceEntry =
                serde_json::from_value(value).with_context(|| format!("in {label}"))?;
            declaration(entry, namespace).with_context(|| format!("in {label}"))
        })
        .collect()
}

fn describe(raw: &Value, index: usize) -> String {
    match (raw["kind"].as_str(), raw["name"].as_str()) {
        (Some(kind), Some(name)) => format!("resource #{} ({kind}/{name})", index + 1),
        _ => format!("resource #{}", index + 1),
    }
}

fn declaration(entry: ResourceEntry, default_namespace: &str) -> Result<ResourceDeclaration> {
    if entry.kind.trim().is_empty() || entry.name.trim().is_empty() {
        bail!("kind and name cannot be empty");
    }

    let namespace = if is_namespaced(&entry.kind) {
        Some(entry.namespace.unwrap_or_else(|| default_namespace.to_string()))
    } else if let Some(ns) = entry.namespace {
        bail!("{} is cluster-scoped and cannot have namespace {ns:?}", entry.kind);
    } else {
        None
    };

    let api_version = match entry.api_version {
        Some(version) => version,
        None => default_api_version(&entry.kind)
            .with_context(|| format!("unknown kind {}; set apiVersion", entry.kind))?
            .to_string(),
    };

    let depends_on = entry
        .depends_on
        .iter()
        .map(|dep| {
            ResourceId::parse(dep)
                .with_context(|| format!("invalid depends_on {dep:?}; expected Kind/name or Kind/namespace/name"))
        })
        .collect::<Result<Vec<_>>>()?;

    let id = ResourceId::new(entry.kind, namespace, entry.name);
    Ok(ResourceDeclaration::new(id, api_version, entry.spec)?.with_depends_on(depends_on))
}

/// Substitute `${var}` placeholders in every string of `value`
pub fn interpolate(value: &Value, vars: &Map<String, Value>) -> Result<Value> {
    Ok(match value {
        Value::String(text) => interpolate_str(text, vars)?,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate(item, vars))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate(item, vars)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn interpolate_str(text: &str, vars: &Map<String, Value>) -> Result<Value> {
    if let Some(caps) = WHOLE_PLACEHOLDER.captures(text) {
        return lookup(vars, &caps[1]).cloned();
    }
    if !text.contains('$') {
        return Ok(Value::String(text.to_string()));
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replacement(&caps, vars)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(Value::String(out))
}

fn replacement(caps: &Captures<'_>, vars: &Map<String, Value>) -> Result<String> {
    let Some(name) = caps.get(1) else {
        return Ok("${".to_string());
    };
    match lookup(vars, name.as_str())? {
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            bail!("variable {} is not a scalar and cannot be embedded in text", name.as_str())
        }
        other => Ok(other.to_string()),
    }
}

fn lookup<'a>(vars: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    vars.get(name)
        .with_context(|| format!("undefined variable ${{{name}}}"))
}

/// Typed value of a `--set` argument: bool, integer, float, else string
pub fn parse_var_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

/// Build the override table from `--set` pairs
pub fn overrides(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), parse_var_value(v)))
        .collect()
}
