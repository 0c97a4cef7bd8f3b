//! Resource store access used by the reconcilers
//!
//! Reconcilers only talk to the cluster through [`ObjectStore`]. The
//! production implementation, [`KubeStore`], maps every call onto the
//! Kubernetes API: typed reads, server-side apply with a fixed field manager
//! and forced ownership, and merge patches against the status subresource.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Field manager recorded on every object the operator writes
pub const FIELD_MANAGER: &str = "guestbook-controller";

/// Namespaced identity of an object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a namespaced resource, `None` if it has no namespace
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let namespace = obj.meta().namespace.clone()?;
        let name = obj.meta().name.clone()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Bounds shared by every kind the operator reads or writes
pub trait StoredObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed access to the resource store
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object, `None` when it does not exist
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// List all objects of a kind in a namespace
    async fn list<K: StoredObject>(&self, namespace: &str) -> Result<Vec<K>>;

    /// Declaratively apply an object and return the stored result
    async fn apply<K: StoredObject>(&self, obj: &K) -> Result<K>;

    /// Merge `status` into the status subresource of an object
    async fn patch_status<K: StoredObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoredObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoredObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        let api: Api<K> = self.api(&key.namespace);
        api.get_opt(&key.name).await.map_err(Error::KubeError)
    }

    async fn list<K: StoredObject>(&self, namespace: &str) -> Result<Vec<K>> {
        let api: Api<K> = self.api(namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(list.items)
    }

    async fn apply<K: StoredObject>(&self, obj: &K) -> Result<K> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
        let api: Api<K> = self.api(&namespace);

        debug!("Applying {} {}/{}", K::kind(&()), namespace, name);

        api.patch(
            &name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(obj),
        )
        .await
        .map_err(Error::KubeError)
    }

    async fn patch_status<K: StoredObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<()> {
        let api: Api<K> = self.api(&key.namespace);
        let patch = serde_json::json!({ "status": status });

        api.patch_status(
            &key.name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::StatusUpdate(format!("{} {}: {}", K::kind(&()), key, e)))?;

        Ok(())
    }
}
