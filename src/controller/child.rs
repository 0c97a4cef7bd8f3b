//! Owned child objects
//!
//! The operator only ever owns Deployments and Services, so child handling
//! dispatches over a closed enum instead of dynamic kinds.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use super::store::{ObjectKey, ObjectStore};
use crate::error::Result;

/// A child object written by one of the reconcilers
#[derive(Clone, Debug)]
pub enum ChildObject {
    Deployment(Deployment),
    Service(Service),
}

impl ChildObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ChildObject::Deployment(_) => "Deployment",
            ChildObject::Service(_) => "Service",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ChildObject::Deployment(d) => &d.metadata,
            ChildObject::Service(s) => &s.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Apply the object through the store, keeping its variant
    pub async fn apply<S: ObjectStore>(&self, store: &S) -> Result<ChildObject> {
        match self {
            ChildObject::Deployment(d) => store.apply(d).await.map(ChildObject::Deployment),
            ChildObject::Service(s) => store.apply(s).await.map(ChildObject::Service),
        }
    }

    pub fn into_service(self) -> Option<Service> {
        match self {
            ChildObject::Service(s) => Some(s),
            ChildObject::Deployment(_) => None,
        }
    }
}

impl From<Deployment> for ChildObject {
    fn from(d: Deployment) -> Self {
        ChildObject::Deployment(d)
    }
}

impl From<Service> for ChildObject {
    fn from(s: Service) -> Self {
        ChildObject::Service(s)
    }
}

/// The single controller owner reference of an object, if any
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true))
}

/// Identity of the controller owner of an object when that owner is of kind `P`
///
/// Owner references are always same-namespace, so the owner lives in the
/// child's namespace.
pub fn owner_key<P>(meta: &ObjectMeta) -> Option<ObjectKey>
where
    P: Resource<DynamicType = ()>,
{
    let owner = controller_owner(meta)?;
    if owner.kind != P::kind(&()) || owner.api_version != P::api_version(&()) {
        return None;
    }
    let namespace = meta.namespace.clone()?;
    Some(ObjectKey::new(namespace, owner.name.clone()))
}
