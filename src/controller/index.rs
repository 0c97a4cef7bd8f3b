//! Dependency index from a Redis to the RestApis that reference it
//!
//! The index is derived entirely from `spec.redisName` of live RestApi
//! objects. It is fed by the RestApi watch stream before events reach the
//! controller queue, so a lookup never lags behind the object that triggered
//! it. Lookups are concurrent and lock-free for readers.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use tracing::{debug, trace};

use super::store::ObjectKey;
use crate::crd::RestApi;

/// Extract the Redis a RestApi depends on
///
/// References are resolved in the RestApi's own namespace. An empty name
/// produces no index entry.
pub fn dependency_of(api: &RestApi) -> Option<ObjectKey> {
    let namespace = api.metadata.namespace.as_deref()?;
    if api.spec.redis_name.is_empty() {
        return None;
    }
    Some(ObjectKey::new(namespace, api.spec.redis_name.clone()))
}

#[derive(Default)]
struct IndexState {
    /// Redis -> RestApis referencing it
    dependents: DashMap<ObjectKey, BTreeSet<ObjectKey>>,
    /// RestApi -> Redis it currently references
    references: DashMap<ObjectKey, ObjectKey>,
    /// RestApis seen since the last watcher `Init`
    relisted: DashSet<ObjectKey>,
}

/// Reverse lookup from a Redis identity to its dependent RestApis
#[derive(Clone, Default)]
pub struct DependencyIndex {
    state: Arc<IndexState>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the index from a RestApi watcher event
    ///
    /// Must be driven by a single watch stream; concurrent lookups are fine.
    pub fn observe(&self, event: &watcher::Event<RestApi>) {
        match event {
            watcher::Event::Apply(api) => self.upsert(api),
            watcher::Event::Delete(api) => {
                if let Some(key) = ObjectKey::from_resource(api) {
                    self.remove(&key);
                }
            }
            watcher::Event::Init => {
                self.state.relisted.clear();
            }
            watcher::Event::InitApply(api) => {
                if let Some(key) = ObjectKey::from_resource(api) {
                    self.state.relisted.insert(key);
                }
                self.upsert(api);
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    /// Record the current reference of a RestApi
    pub fn upsert(&self, api: &RestApi) {
        let Some(key) = ObjectKey::from_resource(api) else {
            return;
        };
        self.set_reference(key, dependency_of(api));
    }

    /// Drop a RestApi from the index
    pub fn remove(&self, frontend: &ObjectKey) {
        self.set_reference(frontend.clone(), None);
    }

    fn set_reference(&self, frontend: ObjectKey, dependency: Option<ObjectKey>) {
        let previous = match &dependency {
            Some(dep) => self
                .state
                .references
                .insert(frontend.clone(), dep.clone()),
            None => self.state.references.remove(&frontend).map(|(_, dep)| dep),
        };

        if previous == dependency {
            return;
        }

        if let Some(prev) = previous {
            if let Some(mut set) = self.state.dependents.get_mut(&prev) {
                set.remove(&frontend);
            }
            self.state
                .dependents
                .remove_if(&prev, |_, set| set.is_empty());
            trace!(frontend = %frontend, dependency = %prev, "Removed index entry");
        }

        if let Some(dep) = dependency {
            trace!(frontend = %frontend, dependency = %dep, "Added index entry");
            self.state
                .dependents
                .entry(dep)
                .or_default()
                .insert(frontend);
        }
    }

    fn finish_relist(&self) {
        let stale: Vec<ObjectKey> = self
            .state
            .references
            .iter()
            .filter(|entry| !self.state.relisted.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for key in &stale {
            self.remove(key);
        }
        self.state.relisted.clear();

        debug!(
            dropped = stale.len(),
            entries = self.state.references.len(),
            "Dependency index relisted"
        );
    }

    /// RestApis referencing a Redis, sorted and de-duplicated
    pub fn dependents(&self, dependency: &ObjectKey) -> Vec<ObjectKey> {
        self.state
            .dependents
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reconcile requests for every RestApi referencing a Redis
    pub fn requests_for(&self, dependency: &ObjectKey) -> Vec<ObjectRef<RestApi>> {
        self.dependents(dependency)
            .into_iter()
            .map(|key| ObjectRef::new(&key.name).within(&key.namespace))
            .collect()
    }

    /// Number of indexed RestApis
    pub fn len(&self) -> usize {
        self.state.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.references.is_empty()
    }

    /// Drop every entry, used when the controllers shut down
    pub fn clear(&self) {
        self.state.dependents.clear();
        self.state.references.clear();
        self.state.relisted.clear();
    }
}
