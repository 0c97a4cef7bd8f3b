//! Shared types for the guestbook CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Compute resource requests and limits for a container
///
/// Keys are Kubernetes resource names (`cpu`, `memory`, `ephemeral-storage`, ...)
/// and values are quantity strings. They are copied verbatim into the
/// generated container spec.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use guestbook_operator::crd::ResourceRequirements;
///
/// let resources = ResourceRequirements {
///     requests: BTreeMap::from([("cpu".to_string(), "250m".to_string())]),
///     limits: BTreeMap::new(),
/// };
/// assert!(resources.limits.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Minimum resources requested
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    /// Maximum resources allowed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// Health state reported by a status condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::Healthy => write!(f, "Healthy"),
            ConditionStatus::Unhealthy => write!(f, "Unhealthy"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Status condition shared by `RestApi` and `Redis`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    /// Type of condition (e.g., "Ready")
    #[serde(rename = "type")]
    pub type_: String,
    /// Healthy, Unhealthy or Unknown
    pub status: ConditionStatus,
    /// Last time the condition was evaluated (RFC 3339)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_probe_time: String,
    /// Last time the status value changed (RFC 3339)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Structured validation error for a resource spec
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Join validation errors into a single message for status and logs
pub fn summarize_validation_errors(errors: &[SpecValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
