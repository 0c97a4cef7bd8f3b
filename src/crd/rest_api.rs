//! RestApi Custom Resource Definition
//!
//! A RestApi is the stateless guestbook frontend tier. It references a
//! [`Redis`](super::Redis) in the same namespace by name and publishes the
//! externally reachable URL of its service in status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ResourceRequirements, SpecValidationError, StatusCondition};

/// Default frontend serving port
pub const DEFAULT_SERVING_PORT: i32 = 8080;

/// Default frontend replica count
pub const DEFAULT_FRONTEND_REPLICAS: i32 = 1;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "webapp.guestbook.dev",
    version = "v1",
    kind = "RestApi",
    plural = "restapis",
    namespaced,
    status = "RestApiStatus",
    shortname = "rapi",
    printcolumn = r#"{"name":"Redis","type":"string","jsonPath":".spec.redisName"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestApiSpec {
    pub frontend: FrontendSpec,

    /// Name of the Redis in the same namespace this frontend talks to
    #[serde(default)]
    pub redis_name: String,
}

/// Frontend tier settings
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrontendSpec {
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Port reported in the published URL
    #[serde(rename = "serverPort", default = "default_serving_port")]
    #[schemars(range(min = 0))]
    pub serving_port: i32,

    #[serde(default = "default_frontend_replicas")]
    #[schemars(range(min = 0))]
    pub replicas: i32,
}

impl Default for FrontendSpec {
    fn default() -> Self {
        Self {
            resources: ResourceRequirements::default(),
            serving_port: DEFAULT_SERVING_PORT,
            replicas: DEFAULT_FRONTEND_REPLICAS,
        }
    }
}

fn default_serving_port() -> i32 {
    DEFAULT_SERVING_PORT
}

fn default_frontend_replicas() -> i32 {
    DEFAULT_FRONTEND_REPLICAS
}

impl RestApiSpec {
    /// Validate the spec, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.frontend.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.frontend.replicas",
                "replicas must be greater than or equal to 0",
            ));
        }

        if self.frontend.serving_port < 0 {
            errors.push(SpecValidationError::new(
                "spec.frontend.serverPort",
                "serverPort must be greater than or equal to 0",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Observed state of a RestApi
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestApiStatus {
    /// Externally reachable URL, empty until the service has an external address
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}
