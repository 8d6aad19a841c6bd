//! In-crate fake of the remote API for executor tests

use crate::context::ResourceApi;
use crate::error::ApiError;
use crate::types::ResourceId;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Update,
}

#[derive(Default)]
pub struct FakeApi {
    store: Mutex<BTreeMap<ResourceId, Value>>,
    calls: Mutex<Vec<(Op, ResourceId, Option<Value>)>>,
    failures: Mutex<HashMap<(Op, ResourceId), VecDeque<ApiError>>>,
    stalls: Mutex<HashMap<(Op, ResourceId), VecDeque<Duration>>>,
    version: AtomicU64,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `op` on `id` with `error`
    pub fn fail(&self, op: Op, id: &ResourceId, error: ApiError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry((op, id.clone())).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Make the next call of `op` on `id` sleep before answering
    pub fn stall(&self, op: Op, id: &ResourceId, delay: Duration) {
        self.stalls
            .lock()
            .unwrap()
            .entry((op, id.clone()))
            .or_default()
            .push_back(delay);
    }

    pub fn seed(&self, id: &ResourceId, object: Value) {
        self.store.lock().unwrap().insert(id.clone(), object);
    }

    pub fn stored(&self, id: &ResourceId) -> Option<Value> {
        self.store.lock().unwrap().get(id).cloned()
    }

    pub fn count(&self, op: Op, id: &ResourceId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, i, _)| *o == op && i == id)
            .count()
    }

    pub fn mutations(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _, _)| *o != Op::Get)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn touched(&self, id: &ResourceId) -> bool {
        self.calls.lock().unwrap().iter().any(|(_, i, _)| i == id)
    }

    /// Bodies sent with `op` for `id`, in call order
    pub fn bodies(&self, op: Op, id: &ResourceId) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, i, _)| *o == op && i == id)
            .filter_map(|(_, _, body)| body.clone())
            .collect()
    }

    /// Stored objects with server-assigned metadata removed
    pub fn user_state(&self) -> BTreeMap<ResourceId, Value> {
        let mut state = self.store.lock().unwrap().clone();
        for object in state.values_mut() {
            if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
                meta.remove("uid");
                meta.remove("resourceVersion");
            }
        }
        state
    }

    fn record(&self, op: Op, id: &ResourceId, body: Option<&Value>) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push((op, id.clone(), body.cloned()));

        let stall = self
            .stalls
            .lock()
            .unwrap()
            .get_mut(&(op, id.clone()))
            .and_then(VecDeque::pop_front);
        if let Some(delay) = stall {
            thread::sleep(delay);
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&(op, id.clone()))
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

impl ResourceApi for FakeApi {
    fn get(&self, id: &ResourceId) -> Result<Option<Value>, ApiError> {
        self.record(Op::Get, id, None)?;
        Ok(self.stored(id))
    }

    fn create(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError> {
        self.record(Op::Create, id, Some(object))?;
        let mut store = self.store.lock().unwrap();
        if store.contains_key(id) {
            return Err(ApiError::conflict(format!("{id} already exists")));
        }
        let mut stored = object.clone();
        let version = self.next_version();
        stored["metadata"]["uid"] = json!(format!("uid-{version}"));
        stored["metadata"]["resourceVersion"] = json!(version);
        if id.kind == "Service" {
            stored["spec"]["clusterIP"] = json!(format!("10.43.0.{version}"));
        }
        store.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    fn update(&self, id: &ResourceId, object: &Value) -> Result<Value, ApiError> {
        self.record(Op::Update, id, Some(object))?;
        let mut store = self.store.lock().unwrap();
        let Some(current) = store.get(id) else {
            return Err(ApiError::not_found(format!("{id} not found")));
        };
        if current["metadata"]["resourceVersion"] != object["metadata"]["resourceVersion"] {
            return Err(ApiError::conflict("the object has been modified"));
        }
        let mut stored = object.clone();
        stored["metadata"]["resourceVersion"] = json!(self.next_version());
        store.insert(id.clone(), stored.clone());
        Ok(stored)
    }
}
