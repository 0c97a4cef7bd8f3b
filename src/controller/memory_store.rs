//! In-memory [`ObjectStore`] for reconciler tests
//!
//! Objects are kept as JSON keyed by kind and identity. `apply` is a JSON merge
//! of the submitted object into the stored one and only bumps
//! `metadata.resourceVersion` when the merge changed something, which is
//! enough to observe idempotence. Unlike server-side apply, fields dropped
//! from the submitted object are not removed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::store::{ObjectKey, ObjectStore, StoredObject};
use crate::error::{Error, Result};

type StoreKey = (String, ObjectKey);

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<StoreKey, Value>>,
    next_uid: AtomicU64,
    next_version: AtomicU64,
    writes: AtomicUsize,
    fail_status: AtomicBool,
}

fn store_key<K: StoredObject>(key: ObjectKey) -> StoreKey {
    (K::kind(&()).to_string(), key)
}

/// RFC 7386 merge, arrays are replaced wholesale
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (k, v) in patch {
            if v.is_null() {
                target.remove(k);
            } else {
                merge(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

fn owner_uids(value: &Value) -> Vec<String> {
    value["metadata"]["ownerReferences"]
        .as_array()
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r["uid"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn next_uid(&self) -> String {
        format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Store an object as a user would create it, assigning a uid
    pub fn insert<K: StoredObject>(&self, obj: &K) -> K {
        let key = ObjectKey::from_resource(obj).expect("object needs a namespace and name");
        let mut value = serde_json::to_value(obj).unwrap();
        if value["metadata"]["uid"].is_null() {
            value["metadata"]["uid"] = json!(self.next_uid());
        }
        value["metadata"]["resourceVersion"] = json!(self.next_version());

        self.objects
            .lock()
            .unwrap()
            .insert(store_key::<K>(key), value.clone());
        serde_json::from_value(value).unwrap()
    }

    /// Replace the spec of a stored object, as an edit by a user would
    pub fn update_spec<K: StoredObject>(&self, key: &ObjectKey, spec: Value) {
        let mut objects = self.objects.lock().unwrap();
        let value = objects
            .get_mut(&store_key::<K>(key.clone()))
            .expect("object to update must exist");
        value["spec"] = spec;
        value["metadata"]["resourceVersion"] = json!(self.next_version());
    }

    /// Simulate the cloud provider assigning an external address
    pub fn set_load_balancer_ingress(&self, key: &ObjectKey, ingress: Value) {
        let mut objects = self.objects.lock().unwrap();
        let value = objects
            .get_mut(&("Service".to_string(), key.clone()))
            .expect("service must exist");
        value["status"] = json!({ "loadBalancer": { "ingress": [ingress] } });
        value["metadata"]["resourceVersion"] = json!(self.next_version());
    }

    pub fn resource_version<K: StoredObject>(&self, key: &ObjectKey) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&store_key::<K>(key.clone()))
            .and_then(|v| v["metadata"]["resourceVersion"].as_str().map(str::to_string))
    }

    /// Number of writes that changed a stored object
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Delete an object and, like the garbage collector, everything it owns
    pub fn delete_cascade<K: StoredObject>(&self, key: &ObjectKey) {
        let mut objects = self.objects.lock().unwrap();
        let Some(root) = objects.remove(&store_key::<K>(key.clone())) else {
            return;
        };

        let mut orphaned: Vec<String> = root["metadata"]["uid"]
            .as_str()
            .map(|uid| vec![uid.to_string()])
            .unwrap_or_default();
        while let Some(uid) = orphaned.pop() {
            let owned: Vec<StoreKey> = objects
                .iter()
                .filter(|(_, v)| owner_uids(v).contains(&uid))
                .map(|(k, _)| k.clone())
                .collect();
            for k in owned {
                if let Some(child) = objects.remove(&k) {
                    if let Some(child_uid) = child["metadata"]["uid"].as_str() {
                        orphaned.push(child_uid.to_string());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        let value = self
            .objects
            .lock()
            .unwrap()
            .get(&store_key::<K>(key.clone()))
            .cloned();
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn list<K: StoredObject>(&self, namespace: &str) -> Result<Vec<K>> {
        let kind = K::kind(&()).to_string();
        let values: Vec<Value> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, key), _)| *k == kind && key.namespace == namespace)
            .map(|(_, v)| v.clone())
            .collect();
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn apply<K: StoredObject>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_resource(obj)
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let incoming = serde_json::to_value(obj)?;

        let mut objects = self.objects.lock().unwrap();
        let stored = match objects.get(&store_key::<K>(key.clone())) {
            Some(existing) => {
                let mut merged = existing.clone();
                merge(&mut merged, &incoming);
                if merged != *existing {
                    merged["metadata"]["resourceVersion"] = json!(self.next_version());
                    self.writes.fetch_add(1, Ordering::SeqCst);
                }
                merged
            }
            None => {
                let mut created = incoming;
                created["metadata"]["uid"] = json!(self.next_uid());
                created["metadata"]["resourceVersion"] = json!(self.next_version());
                self.writes.fetch_add(1, Ordering::SeqCst);
                created
            }
        };
        objects.insert(store_key::<K>(key), stored.clone());

        Ok(serde_json::from_value(stored)?)
    }

    async fn patch_status<K: StoredObject>(&self, key: &ObjectKey, status: Value) -> Result<()> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::StatusUpdate(format!("{} {}: injected failure", K::kind(&()), key)));
        }

        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get_mut(&store_key::<K>(key.clone())) else {
            return Err(Error::StatusUpdate(format!("{} {} not found", K::kind(&()), key)));
        };

        let mut merged = existing.clone();
        merge(&mut merged, &json!({ "status": status }));
        if merged != *existing {
            merged["metadata"]["resourceVersion"] = json!(self.next_version());
            self.writes.fetch_add(1, Ordering::SeqCst);
            *existing = merged;
        }
        Ok(())
    }
}
