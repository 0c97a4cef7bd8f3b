//! Kubernetes resource builders for RestApi and Redis
//!
//! Every builder is a pure function from the parent resource (and, for the
//! frontend, the resolved Redis) to the complete desired child object. Owner
//! references are attached here, before anything is written, so a child can
//! never reach the store without its parent link.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
    ResourceRequirements as K8sResources, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{Redis, ResourceRequirements, RestApi};
use crate::error::{Error, Result};

/// Label selecting the pods of a RestApi
pub const REST_API_LABEL: &str = "restapi";
/// Label selecting the pods of a Redis
pub const REDIS_LABEL: &str = "redis";
/// Label distinguishing leader and follower pods
pub const ROLE_LABEL: &str = "role";
/// Marks every child written by the operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "guestbook-operator";

pub const FRONTEND_IMAGE: &str = "gcr.io/google-samples/gb-frontend:v4";
pub const FRONTEND_CONTAINER_PORT: i32 = 80;
pub const FRONTEND_SERVICE_PORT: i32 = 8080;

pub const REDIS_LEADER_IMAGE: &str = "registry.k8s.io/redis:e2e";
pub const REDIS_FOLLOWER_IMAGE: &str = "gcr.io/google_samples/gb-redisslave:v3";
pub const REDIS_PORT: i32 = 6379;

/// Fixed requests for every Redis container
pub const REDIS_CPU_REQUEST: &str = "100m";
pub const REDIS_MEMORY_REQUEST: &str = "100Mi";

/// Role of a Redis Deployment/Service pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedisRole {
    Leader,
    Follower,
}

impl RedisRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisRole::Leader => "leader",
            RedisRole::Follower => "follower",
        }
    }

    fn image(&self) -> &'static str {
        match self {
            RedisRole::Leader => REDIS_LEADER_IMAGE,
            RedisRole::Follower => REDIS_FOLLOWER_IMAGE,
        }
    }
}

/// Create a controller OwnerReference for garbage collection and event routing
///
/// Fails when the parent has not been persisted yet (no name or uid), since a
/// child without a resolvable owner would never be cascaded or routed back.
pub fn owner_reference<K>(parent: &K) -> Result<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&()).to_string();
    let name = parent
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::OwnerReference(format!("{} has no metadata.name", kind)))?;
    let uid = parent
        .meta()
        .uid
        .clone()
        .ok_or_else(|| Error::OwnerReference(format!("{} {} has no metadata.uid", kind, name)))?;

    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind,
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Standard labels for a child resource
fn standard_labels(instance: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "guestbook".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        instance.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels
}

fn child_meta(
    name: String,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    owner: OwnerReference,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace,
        labels: Some(labels),
        owner_references: Some(vec![owner]),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

/// Convert CRD resource requirements verbatim into the Kubernetes type
pub fn container_resources(resources: &ResourceRequirements) -> K8sResources {
    K8sResources {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        claims: None,
    }
}

// ============================================================================
// Redis
// ============================================================================

/// Name of the Deployment/Service for a Redis role, `<name>-<role>`
pub fn redis_child_name(redis_name: &str, role: RedisRole) -> String {
    format!("{}-{}", redis_name, role.as_str())
}

fn redis_selector(redis: &Redis, role: RedisRole) -> BTreeMap<String, String> {
    BTreeMap::from([
        (REDIS_LABEL.to_string(), redis.name_any()),
        (ROLE_LABEL.to_string(), role.as_str().to_string()),
    ])
}

fn redis_labels(redis: &Redis, role: RedisRole) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&redis.name_any(), role.as_str());
    labels.extend(redis_selector(redis, role));
    labels
}

fn redis_requests() -> K8sResources {
    K8sResources {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(REDIS_CPU_REQUEST.to_string())),
            (
                "memory".to_string(),
                Quantity(REDIS_MEMORY_REQUEST.to_string()),
            ),
        ])),
        ..Default::default()
    }
}

fn redis_deployment(redis: &Redis, role: RedisRole, replicas: i32) -> Result<Deployment> {
    let name = redis_child_name(&redis.name_any(), role);
    let selector = redis_selector(redis, role);
    let labels = redis_labels(redis, role);

    let env_vars = match role {
        RedisRole::Leader => None,
        RedisRole::Follower => Some(vec![
            env("GET_HOSTS_FROM", "env"),
            env(
                "REDIS_MASTER_SERVICE_HOST",
                redis_child_name(&redis.name_any(), RedisRole::Leader),
            ),
            env(
                "REDIS_SLAVE_SERVICE_HOST",
                redis_child_name(&redis.name_any(), RedisRole::Follower),
            ),
        ]),
    };

    Ok(Deployment {
        metadata: child_meta(name, redis.namespace(), labels.clone(), owner_reference(redis)?),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: role.as_str().to_string(),
                        image: Some(role.image().to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: REDIS_PORT,
                            name: Some("redis".to_string()),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: env_vars,
                        resources: Some(redis_requests()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// Desired leader Deployment, always a single replica
pub fn build_leader_deployment(redis: &Redis) -> Result<Deployment> {
    redis_deployment(redis, RedisRole::Leader, 1)
}

/// Desired follower Deployment, scaled by `spec.followerReplicas`
pub fn build_follower_deployment(redis: &Redis) -> Result<Deployment> {
    redis_deployment(redis, RedisRole::Follower, redis.spec.follower_replicas)
}

/// Desired Service for one Redis role
pub fn build_redis_service(redis: &Redis, role: RedisRole) -> Result<Service> {
    let name = redis_child_name(&redis.name_any(), role);

    Ok(Service {
        metadata: child_meta(
            name,
            redis.namespace(),
            redis_labels(redis, role),
            owner_reference(redis)?,
        ),
        spec: Some(ServiceSpec {
            selector: Some(redis_selector(redis, role)),
            ports: Some(vec![ServicePort {
                name: Some("redis".to_string()),
                port: REDIS_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String("redis".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

// ============================================================================
// RestApi
// ============================================================================

fn rest_api_selector(api: &RestApi) -> BTreeMap<String, String> {
    BTreeMap::from([(REST_API_LABEL.to_string(), api.name_any())])
}

fn rest_api_labels(api: &RestApi) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&api.name_any(), "frontend");
    labels.extend(rest_api_selector(api));
    labels
}

/// Desired frontend Deployment wired to the Redis' published endpoints
pub fn build_frontend_deployment(api: &RestApi, redis: &Redis) -> Result<Deployment> {
    let labels = rest_api_labels(api);
    let endpoints = redis.status.clone().unwrap_or_default();

    Ok(Deployment {
        metadata: child_meta(
            api.name_any(),
            api.namespace(),
            labels.clone(),
            owner_reference(api)?,
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(api.spec.frontend.replicas),
            selector: LabelSelector {
                match_labels: Some(rest_api_selector(api)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "frontend".to_string(),
                        image: Some(FRONTEND_IMAGE.to_string()),
                        env: Some(vec![
                            env("GET_HOSTS_FROM", "env"),
                            env("REDIS_MASTER_SERVICE_HOST", endpoints.leader_service),
                            env("REDIS_SLAVE_SERVICE_HOST", endpoints.follower_service),
                        ]),
                        ports: Some(vec![ContainerPort {
                            container_port: FRONTEND_CONTAINER_PORT,
                            name: Some("http".to_string()),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        resources: Some(container_resources(&api.spec.frontend.resources)),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// Desired externally reachable frontend Service
pub fn build_frontend_service(api: &RestApi) -> Result<Service> {
    Ok(Service {
        metadata: child_meta(
            api.name_any(),
            api.namespace(),
            rest_api_labels(api),
            owner_reference(api)?,
        ),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(rest_api_selector(api)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: FRONTEND_SERVICE_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String("http".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}
