//! Error types for the guestbook operator
//!
//! Every reconciliation failure is returned to the controller runtime, which
//! decides on requeue timing through [`Error::is_retriable`].

use std::time::Duration;

use thiserror::Error;

/// Errors produced while reconciling `RestApi` and `Redis` resources
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The `Redis` named by a `RestApi` cannot be resolved
    #[error("Referenced Redis {namespace}/{name} not found")]
    DependencyNotFound { namespace: String, name: String },

    /// A child object could not be tied to its parent
    #[error("Failed to set owner reference: {0}")]
    OwnerReference(String),

    /// Writing the status subresource failed
    #[error("Status update failed: {0}")]
    StatusUpdate(String),

    /// The reconciliation attempt exceeded its deadline
    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Resource spec is invalid
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Operator configuration or bootstrap error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the failure is transient and worth a fast retry
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                }
                kube::Error::Service(_) | kube::Error::HyperError(_) => true,
                _ => false,
            },
            Error::DependencyNotFound { .. }
            | Error::OwnerReference(_)
            | Error::StatusUpdate(_)
            | Error::Timeout(_) => true,
            Error::ValidationError(_)
            | Error::MissingField(_)
            | Error::SerializationError(_)
            | Error::ConfigError(_) => false,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(e)) if e.code == 404)
    }

    /// Short error category used as a metric label
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::DependencyNotFound { .. } => "dependency_not_found",
            Error::OwnerReference(_) => "owner_reference",
            Error::StatusUpdate(_) => "status_update",
            Error::Timeout(_) => "timeout",
            Error::ValidationError(_) => "validation",
            Error::MissingField(_) => "missing_field",
            Error::SerializationError(_) => "serialization",
            Error::ConfigError(_) => "config",
        }
    }
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
