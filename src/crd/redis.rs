//! Redis Custom Resource Definition
//!
//! A Redis is a single-leader, N-follower replicated cache. The operator
//! realizes it as two Deployments and two Services and publishes the service
//! names in status so frontends can be wired to them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{SpecValidationError, StatusCondition};

/// Default follower replica count
pub const DEFAULT_FOLLOWER_REPLICAS: i32 = 1;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "webapp.guestbook.dev",
    version = "v1",
    kind = "Redis",
    plural = "redis",
    namespaced,
    status = "RedisStatus",
    printcolumn = r#"{"name":"Followers","type":"integer","jsonPath":".spec.followerReplicas"}"#,
    printcolumn = r#"{"name":"Leader","type":"string","jsonPath":".status.leaderService"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
    #[serde(default = "default_follower_replicas")]
    #[schemars(range(min = 0))]
    pub follower_replicas: i32,
}

impl Default for RedisSpec {
    fn default() -> Self {
        Self {
            follower_replicas: DEFAULT_FOLLOWER_REPLICAS,
        }
    }
}

fn default_follower_replicas() -> i32 {
    DEFAULT_FOLLOWER_REPLICAS
}

impl RedisSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        if self.follower_replicas < 0 {
            return Err(vec![SpecValidationError::new(
                "spec.followerReplicas",
                "followerReplicas must be greater than or equal to 0",
            )]);
        }
        Ok(())
    }
}

/// Observed state of a Redis
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisStatus {
    /// Name of the Service fronting the leader
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader_service: String,

    /// Name of the Service fronting the followers
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub follower_service: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

impl RedisStatus {
    /// Both endpoints have been published
    pub fn has_endpoints(&self) -> bool {
        !self.leader_service.is_empty() && !self.follower_service.is_empty()
    }
}
