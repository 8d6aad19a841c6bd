//! Resource declarations and field references
//!
//! A [`ResourceDeclaration`] is a named, typed unit of desired state. Its
//! spec is an opaque JSON mapping; the only structure the engine looks for
//! inside it is the `$ref` marker:
//!
//! ```json
//! { "claimName": { "$ref": "PersistentVolumeClaim/my-nfs-pvc#metadata.name" } }
//! ```
//!
//! At submission time every marker is replaced by the referenced field of
//! the target's realized object.

use crate::error::PlanError;
use crate::types::ResourceId;
use serde_json::{Map, Value};
use std::fmt;

/// Key that marks a field reference inside a spec
pub const REF_KEY: &str = "$ref";

/// Field used when a reference carries no `#path` suffix
pub const DEFAULT_REF_FIELD: &str = "metadata.name";

/// One segment of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A path into a JSON object, e.g. `spec.ports.0.port` or `spec.ports[0].port`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The empty path (addresses the root value)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path; returns None for empty or malformed input
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in text.split('.') {
            if part.is_empty() {
                return None;
            }
            let (key, mut rest) = match part.find('[') {
                Some(idx) => (&part[..idx], &part[idx..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                match key.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Key(key.to_string())),
                }
            } else if rest.is_empty() {
                return None;
            }
            while !rest.is_empty() {
                let close = rest.find(']')?;
                let index = rest[1..close].parse::<usize>().ok()?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }
        Some(Self(segments))
    }

    /// Child path with an object key appended
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    /// Child path with an array index appended
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// JSON pointer (RFC 6901) for this path
    pub fn to_pointer(&self) -> String {
        let mut pointer = String::new();
        for segment in &self.0 {
            pointer.push('/');
            match segment {
                PathSegment::Key(k) => pointer.push_str(&k.replace('~', "~0").replace('/', "~1")),
                PathSegment::Index(i) => pointer.push_str(&i.to_string()),
            }
        }
        pointer
    }

    /// Look up the value at this path
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        value.pointer(&self.to_pointer())
    }

    /// Replace the value at this path; false if the path does not exist
    pub fn set(&self, root: &mut Value, new_value: Value) -> bool {
        match root.pointer_mut(&self.to_pointer()) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect();
        f.write_str(&parts.join("."))
    }
}

/// A lazy pointer from a location in one declaration's spec to a field of
/// another declaration's realized object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReference {
    /// Where the `$ref` marker sits inside the referring spec
    pub at: FieldPath,
    /// The referenced declaration; two-part references carry no namespace
    /// until the planner resolves them
    pub target: ResourceId,
    /// Field of the target's realized object
    pub field: FieldPath,
}

impl FieldReference {
    /// Parse `Kind/name#field.path` or `Kind/namespace/name#field.path`
    pub fn parse(at: FieldPath, text: &str) -> Result<Self, PlanError> {
        let invalid = |message: &str| PlanError::InvalidReference {
            value: text.to_string(),
            message: message.to_string(),
        };

        let (target, field) = match text.split_once('#') {
            Some((t, f)) => (t, f),
            None => (text, DEFAULT_REF_FIELD),
        };
        let target = ResourceId::parse(target)
            .ok_or_else(|| invalid("expected Kind/name or Kind/namespace/name"))?;
        let field = FieldPath::parse(field).ok_or_else(|| invalid("malformed field path"))?;

        Ok(Self { at, target, field })
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}#{}", self.at, self.target, self.field)
    }
}

/// A named, typed unit of desired state
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    pub id: ResourceId,
    pub api_version: String,
    /// Every object field except apiVersion, kind, metadata.name and
    /// metadata.namespace
    pub spec: Map<String, Value>,
    /// Ordering-only edges to other declarations
    pub depends_on: Vec<ResourceId>,
    references: Vec<FieldReference>,
}

impl ResourceDeclaration {
    /// Build a declaration, collecting the `$ref` markers in its spec
    pub fn new(
        id: ResourceId,
        api_version: impl Into<String>,
        spec: Map<String, Value>,
    ) -> Result<Self, PlanError> {
        let mut references = Vec::new();
        for (key, value) in &spec {
            collect_references(value, FieldPath::root().key(key), &mut references)?;
        }

        Ok(Self {
            id,
            api_version: api_version.into(),
            spec,
            depends_on: Vec::new(),
            references,
        })
    }

    /// Add ordering-only dependencies
    pub fn with_depends_on(mut self, depends_on: Vec<ResourceId>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn references(&self) -> &[FieldReference] {
        &self.references
    }

    pub(crate) fn references_mut(&mut self) -> &mut [FieldReference] {
        &mut self.references
    }

    /// Every declaration this one must wait for, without duplicates
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps: Vec<ResourceId> = Vec::new();
        let targets = self
            .references
            .iter()
            .map(|r| &r.target)
            .chain(self.depends_on.iter());
        for target in targets {
            if !deps.contains(target) {
                deps.push(target.clone());
            }
        }
        deps
    }

    /// The full desired object, with `$ref` markers still in place
    pub fn desired_object(&self) -> Value {
        let mut body = Map::new();
        for (key, value) in &self.spec {
            if key != "metadata" {
                body.insert(key.clone(), value.clone());
            }
        }

        let mut metadata = self
            .spec
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        metadata.insert("name".into(), Value::String(self.id.name.clone()));
        if let Some(ns) = &self.id.namespace {
            metadata.insert("namespace".into(), Value::String(ns.clone()));
        }

        body.insert("apiVersion".into(), Value::String(self.api_version.clone()));
        body.insert("kind".into(), Value::String(self.id.kind.clone()));
        body.insert("metadata".into(), Value::Object(metadata));
        Value::Object(body)
    }

    /// The desired object with every reference replaced by `resolve`
    pub fn render<E>(
        &self,
        mut resolve: impl FnMut(&FieldReference) -> Result<Value, E>,
    ) -> Result<Value, E> {
        let mut body = self.desired_object();
        for reference in &self.references {
            let value = resolve(reference)?;
            reference.at.set(&mut body, value);
        }
        Ok(body)
    }
}

fn collect_references(
    value: &Value,
    at: FieldPath,
    out: &mut Vec<FieldReference>,
) -> Result<(), PlanError> {
    match value {
        Value::Object(map) => {
            if let Some(marker) = map.get(REF_KEY) {
                let text = match (marker, map.len()) {
                    (Value::String(s), 1) => s,
                    _ => {
                        return Err(PlanError::InvalidReference {
                            value: Value::Object(map.clone()).to_string(),
                            message: format!("{REF_KEY} must be the only key and hold a string"),
                        });
                    }
                };
                out.push(FieldReference::parse(at, text)?);
                return Ok(());
            }
            for (key, child) in map {
                collect_references(child, at.key(key), out)?;
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_references(child, at.index(index), out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
