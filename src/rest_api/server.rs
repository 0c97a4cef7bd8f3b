//! Axum HTTP server for the REST API

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::controller::DependencyIndex;
use crate::{Error, Result};

use super::handlers;

/// Build the router served by [`run_server`]
pub fn router(index: DependencyIndex) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/v1/namespaces/{namespace}/redis/{name}/dependents",
            get(handlers::list_dependents),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(index)
}

/// Run the REST API server
pub async fn run_server(index: DependencyIndex, port: u16) -> Result<()> {
    let app = router(index);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("REST API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    Ok(())
}
