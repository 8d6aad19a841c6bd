//! Diff computation for resources
//!
//! Equality is semantic: the live object is in sync when every field the
//! desired object sets has the same value live. Fields the server adds
//! (uid, resourceVersion, status, defaults) are ignored.

use crate::context::ResourceApi;
use crate::planner::ExecutionPlan;
use crate::resource::FieldPath;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

/// Placeholder rendered for references whose target is not realized yet
pub const KNOWN_AFTER_APPLY: &str = "<known after apply>";

/// A single field whose live value differs from the desired one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    /// Dotted path of the field
    pub path: String,
    pub desired: Value,
    /// `None` when the field is missing live
    pub live: Option<Value>,
}

/// Compute every field of `desired` that `live` does not match
pub fn drift(desired: &Value, live: &Value) -> Vec<FieldDrift> {
    let mut out = Vec::new();
    collect_drift(desired, Some(live), &FieldPath::root(), &mut out);
    out
}

/// Check whether `live` already satisfies `desired`
pub fn is_in_sync(desired: &Value, live: &Value) -> bool {
    drift(desired, live).is_empty()
}

fn collect_drift(desired: &Value, live: Option<&Value>, path: &FieldPath, out: &mut Vec<FieldDrift>) {
    let Some(live) = live else {
        // The server omits empty maps, lists and nulls
        if !is_empty_value(desired) {
            out.push(FieldDrift {
                path: path.to_string(),
                desired: desired.clone(),
                live: None,
            });
        }
        return;
    };

    match (desired, live) {
        (Value::Object(want), Value::Object(have)) => {
            for (key, value) in want {
                collect_drift(value, have.get(key), &path.key(key), out);
            }
        }
        (Value::Array(want), Value::Array(have)) if want.len() == have.len() => {
            for (index, (w, h)) in want.iter().zip(have).enumerate() {
                collect_drift(w, Some(h), &path.index(index), out);
            }
        }
        (Value::Number(want), Value::Number(have)) if want.as_f64() == have.as_f64() => {}
        (Value::Null, Value::Null) => {}
        _ if desired == live => {}
        _ if is_empty_value(desired) && is_empty_value(live) => {}
        _ => out.push(FieldDrift {
            path: path.to_string(),
            desired: desired.clone(),
            live: Some(live.clone()),
        }),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Deep-merge `desired` onto `live`.
///
/// Objects merge key by key; arrays and scalars from `desired` replace the
/// live value. Everything only the server knows (resourceVersion, uid) is
/// kept, which gives updates optimistic concurrency for free.
pub fn merge(live: &Value, desired: &Value) -> Value {
    match (live, desired) {
        (Value::Object(have), Value::Object(want)) => {
            let mut merged = have.clone();
            for (key, value) in want {
                let next = match have.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => desired.clone(),
    }
}

/// What applying a declaration would do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Unchanged,
    /// The live state could not be read
    Unknown { error: String },
}

/// A diff between the live and desired state of one declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub id: ResourceId,
    pub change: ChangeKind,
    pub drift: Vec<FieldDrift>,
    /// References that could not be resolved from live state
    pub pending_references: Vec<String>,
    pub desired: Value,
    pub live: Option<Value>,
}

impl ResourceDiff {
    pub fn has_changes(&self) -> bool {
        !matches!(self.change, ChangeKind::Unchanged)
    }
}

/// Preview what a submission run would do, issuing only `get` calls.
///
/// References are resolved from the live objects of their targets; when a
/// target does not exist yet its value renders as [`KNOWN_AFTER_APPLY`].
pub fn preview(plan: &ExecutionPlan, api: &dyn ResourceApi) -> Vec<ResourceDiff> {
    let mut live_objects: HashMap<ResourceId, Value> = HashMap::new();
    let mut diffs = Vec::with_capacity(plan.len());

    for node in plan.nodes() {
        let decl = &node.declaration;
        let mut pending = Vec::new();
        let rendered: Result<Value, Infallible> = decl.render(|reference| {
            let value = live_objects
                .get(&reference.target)
                .and_then(|obj| reference.field.lookup(obj))
                .cloned();
            Ok(value.unwrap_or_else(|| {
                pending.push(reference.to_string());
                Value::String(KNOWN_AFTER_APPLY.to_string())
            }))
        });
        let Ok(desired) = rendered;

        let (change, drift_list, live) = match api.get(&decl.id) {
            Ok(None) => (ChangeKind::Create, Vec::new(), None),
            Ok(Some(live)) => {
                let drift_list = drift(&desired, &live);
                let change = if drift_list.is_empty() {
                    ChangeKind::Unchanged
                } else {
                    ChangeKind::Update
                };
                live_objects.insert(decl.id.clone(), live.clone());
                (change, drift_list, Some(live))
            }
            Err(e) => (
                ChangeKind::Unknown {
                    error: e.to_string(),
                },
                Vec::new(),
                None,
            ),
        };

        diffs.push(ResourceDiff {
            id: decl.id.clone(),
            change,
            drift: drift_list,
            pending_references: pending,
            desired,
            live,
        });
    }

    diffs
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to update
    pub modifications: usize,
    /// Number of resources already in sync
    pub unchanged: usize,
    /// Number of resources whose live state could not be read
    pub unknown: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                ChangeKind::Create => summary.additions += 1,
                ChangeKind::Update => summary.modifications += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
                ChangeKind::Unknown { .. } => summary.unknown += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<String, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<String, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.id.kind.clone()).or_default().push(diff);
    }
    groups
}
