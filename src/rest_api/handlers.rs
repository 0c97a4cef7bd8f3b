//! HTTP handlers for the REST API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::instrument;

use crate::controller::{DependencyIndex, ObjectKey};

use super::dto::{DependentsResponse, ErrorResponse, HealthResponse};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint in the Prometheus text format
pub async fn metrics() -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    use prometheus_client::encoding::text::encode;

    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("encode_failed", &e.to_string())),
        )
    })?;
    Ok(buffer)
}

/// RestApis referencing a Redis, as seen by the dependency index
#[instrument(skip(index), fields(name = %name, namespace = %namespace))]
pub async fn list_dependents(
    State(index): State<DependencyIndex>,
    Path((namespace, name)): Path<(String, String)>,
) -> Json<DependentsResponse> {
    let dependents: Vec<String> = index
        .dependents(&ObjectKey::new(namespace.clone(), name.clone()))
        .into_iter()
        .map(|key| key.name)
        .collect();

    Json(DependentsResponse {
        total: dependents.len(),
        namespace,
        redis: name,
        dependents,
    })
}
