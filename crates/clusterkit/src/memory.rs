//! In-memory cluster for tests and offline rehearsal.
//!
//! [`MemoryCluster`] behaves like a small API server: it assigns the fields
//! a real server owns, enforces optimistic concurrency, records every call,
//! and can be told to fail or stall specific calls. Its state can be saved
//! to and loaded from a JSON snapshot so consecutive runs see each other's
//! results.

use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use declarative::{ApiError, ResourceApi, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// First address handed out to Services without a `spec.clusterIP`.
const CLUSTER_IP_BASE: [u8; 2] = [10, 43];

/// The three calls of the API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Read an object.
    Get,
    /// Create an object.
    Create,
    /// Replace an object.
    Update,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Which call was made.
    pub kind: CallKind,
    /// The object it addressed.
    pub id: ResourceId,
    /// Body sent with create and update.
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceId, Value>,
    resource_version: u64,
    allocated_ips: u32,
}

/// Serialized form of a cluster.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    resource_version: u64,
    allocated_ips: u32,
    objects: Vec<Value>,
}

/// A thread-safe, in-memory implementation of [`ResourceApi`].
///
/// # Example
///
/// ```
/// use clusterkit::MemoryCluster;
/// use declarative::{ResourceApi, ResourceId};
/// use serde_json::json;
///
/// let cluster = MemoryCluster::new();
/// let id = ResourceId::namespaced("Service", "default", "nfs");
/// let stored = cluster
///     .create(&id, &json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "nfs", "namespace": "default"}}))
///     .unwrap();
/// assert!(stored["spec"]["clusterIP"].is_string());
/// ```
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<(CallKind, ResourceId), VecDeque<ApiError>>>,
    latency: Option<Duration>,
}

impl MemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Load a cluster from a snapshot; a missing file yields an empty cluster.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No cluster snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| Error::Snapshot {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut objects = BTreeMap::new();
        for object in snapshot.objects {
            let id = identity_of(&object).ok_or_else(|| Error::Snapshot {
                path: path.to_path_buf(),
                message: format!("object without kind or metadata.name: {object}"),
            })?;
            objects.insert(id, object);
        }
        log::debug!("Loaded {} objects from {}", objects.len(), path.display());

        Ok(Self {
            state: Mutex::new(State {
                objects,
                resource_version: snapshot.resource_version,
                allocated_ips: snapshot.allocated_ips,
            }),
            ..Self::default()
        })
    }

    /// Save the cluster's objects to a snapshot file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let state = self.state();
            Snapshot {
                resource_version: state.resource_version,
                allocated_ips: state.allocated_ips,
                objects: state.objects.values().cloned().collect(),
            }
        };
        let content = serde_json::to_string_pretty(&snapshot).map_err(|e| Error::Snapshot {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }

    /// Fail the next `times` calls of `kind` on `id` with `error`.
    pub fn fail_next(&self, kind: CallKind, id: &ResourceId, error: ApiError, times: usize) {
        let mut failures = lock(&self.failures);
        let queue = failures.entry((kind, id.clone())).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Insert an object as if another writer had created it.
    pub fn insert(&self, id: &ResourceId, object: Value) {
        let mut state = self.state();
        let stored = assign_server_fields(&mut state, id, object);
        state.objects.insert(id.clone(), stored);
    }

    /// Get a stored object.
    pub fn object(&self, id: &ResourceId) -> Option<Value> {
        self.state().objects.get(id).cloned()
    }

    /// Identities of all stored objects, sorted.
    pub fn ids(&self) -> Vec<ResourceId> {
        self.state().objects.keys().cloned().collect()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Count calls of one kind on one object.
    pub fn call_count(&self, kind: CallKind, id: &ResourceId) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.kind == kind && &c.id == id)
            .count()
    }

    /// Count create and update calls.
    pub fn mutation_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.kind != CallKind::Get)
            .count()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn begin(&self, kind: CallKind, id: &ResourceId, body: Option<&Value>) -> std::result::Result<(), ApiError> {
        lock(&self.calls).push(Call {
            kind,
            id: id.clone(),
            body: body.cloned(),
        });
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let injected = lock(&self.failures)
            .get_mut(&(kind, id.clone()))
            .and_then(VecDeque::pop_front);
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ResourceApi for MemoryCluster {
    fn get(&self, id: &ResourceId) -> std::result::Result<Option<Value>, ApiError> {
        self.begin(CallKind::Get, id, None)?;
        Ok(self.object(id))
    }

    fn create(&self, id: &ResourceId, object: &Value) -> std::result::Result<Value, ApiError> {
        self.begin(CallKind::Create, id, Some(object))?;
        check_identity(id, object)?;

        let mut state = self.state();
        if state.objects.contains_key(id) {
            return Err(ApiError::conflict(format!(
                "{} \"{}\" already exists",
                id.kind.to_lowercase(),
                id.name
            )));
        }
        let stored = assign_server_fields(&mut state, id, object.clone());
        state.objects.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    fn update(&self, id: &ResourceId, object: &Value) -> std::result::Result<Value, ApiError> {
        self.begin(CallKind::Update, id, Some(object))?;
        check_identity(id, object)?;

        let mut state = self.state();
        let Some(current) = state.objects.get(id).cloned() else {
            return Err(ApiError::not_found(format!(
                "{} \"{}\" not found",
                id.kind.to_lowercase(),
                id.name
            )));
        };

        let sent_version = &object["metadata"]["resourceVersion"];
        if !sent_version.is_null() && *sent_version != current["metadata"]["resourceVersion"] {
            return Err(ApiError::conflict(format!(
                "Operation cannot be fulfilled on {} \"{}\": the object has been modified",
                id.kind.to_lowercase(),
                id.name
            )));
        }

        let mut stored = object.clone();
        for field in ["uid", "creationTimestamp"] {
            stored["metadata"][field] = current["metadata"][field].clone();
        }
        if id.kind == "Service" && stored["spec"]["clusterIP"].is_null() {
            stored["spec"]["clusterIP"] = current["spec"]["clusterIP"].clone();
        }
        let generation = current["metadata"]["generation"].as_u64().unwrap_or(1);
        let spec_changed = stored.get("spec") != current.get("spec");
        stored["metadata"]["generation"] = json!(if spec_changed { generation + 1 } else { generation });
        state.resource_version += 1;
        stored["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());

        state.objects.insert(id.clone(), stored.clone());
        Ok(stored)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reject bodies whose kind or name disagree with the addressed object.
fn check_identity(id: &ResourceId, object: &Value) -> std::result::Result<(), ApiError> {
    if object["kind"].as_str().is_some_and(|kind| kind != id.kind) {
        return Err(ApiError::validation(format!(
            "kind {} does not match {}",
            object["kind"], id
        )));
    }
    if object["metadata"]["name"].as_str().is_some_and(|name| name != id.name) {
        return Err(ApiError::validation(format!(
            "metadata.name {} does not match {}",
            object["metadata"]["name"], id
        )));
    }
    Ok(())
}

fn assign_server_fields(state: &mut State, id: &ResourceId, mut object: Value) -> Value {
    state.resource_version += 1;
    let version = state.resource_version;

    let meta = &mut object["metadata"];
    meta["name"] = json!(id.name);
    if let Some(ns) = &id.namespace {
        meta["namespace"] = json!(ns);
    }
    meta["uid"] = json!(uid_for(id, version));
    meta["resourceVersion"] = json!(version.to_string());
    meta["generation"] = json!(1);
    meta["creationTimestamp"] = json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    if id.kind == "Service" {
        let assigned = object["spec"]["clusterIP"].as_str().is_some_and(|ip| !ip.is_empty());
        if !assigned {
            state.allocated_ips += 1;
            object["spec"]["clusterIP"] = json!(cluster_ip(state.allocated_ips));
        }
    }
    object
}

/// UUID-shaped uid derived from identity and version.
fn uid_for(id: &ResourceId, version: u64) -> String {
    let hash = blake3::hash(format!("{id}@{version}").as_bytes());
    let hex = hash.to_hex();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn cluster_ip(n: u32) -> String {
    let [a, b] = CLUSTER_IP_BASE;
    format!("{a}.{b}.{}.{}", n / 254, n % 254 + 1)
}

fn identity_of(object: &Value) -> Option<ResourceId> {
    let kind = object["kind"].as_str()?;
    let name = object["metadata"]["name"].as_str()?;
    let namespace = object["metadata"]["namespace"].as_str().map(str::to_string);
    Some(ResourceId::new(kind, namespace, name))
}
