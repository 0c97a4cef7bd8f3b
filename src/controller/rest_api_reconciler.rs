//! Reconciler for RestApi resources
//!
//! Resolves the referenced Redis, applies the frontend Deployment and Service
//! wired to the Redis endpoints and publishes the Service's external URL.

use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use super::child::ChildObject;
use super::conditions::{
    conditions_match, set_condition, CONDITION_TYPE_READY, REASON_DEPENDENCY_NOT_FOUND, REASON_INVALID_SPEC,
};
use super::context::Context;
use super::resources::{build_frontend_deployment, build_frontend_service};
use super::status::{rest_api_status, url_for_service};
use super::store::{ObjectKey, ObjectStore};
use crate::crd::{
    summarize_validation_errors, ConditionStatus, Redis, RestApi, RestApiStatus, StatusCondition,
};
use crate::error::{Error, Result};

/// Fetch the Redis a RestApi references, in the RestApi's namespace
pub async fn resolve_dependency<S: ObjectStore>(
    ctx: &Context<S>,
    api: &RestApi,
    key: &ObjectKey,
) -> Result<Redis> {
    let dependency = ObjectKey::new(key.namespace.clone(), api.spec.redis_name.clone());
    let not_found = || Error::DependencyNotFound {
        namespace: dependency.namespace.clone(),
        name: dependency.name.clone(),
    };

    if dependency.name.is_empty() {
        return Err(not_found());
    }

    ctx.store
        .get::<Redis>(&dependency)
        .await?
        .ok_or_else(not_found)
}

/// Drive the children of one RestApi toward its spec
#[instrument(skip(ctx), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_rest_api<S: ObjectStore>(
    ctx: &Context<S>,
    key: &ObjectKey,
) -> Result<Action> {
    let Some(api) = ctx.store.get::<RestApi>(key).await? else {
        debug!("RestApi {} not found, assuming it was deleted", key);
        return Ok(Action::await_change());
    };

    info!("Reconciling RestApi {} (redis: {})", key, api.spec.redis_name);

    let previous = api
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();

    if let Err(errors) = api.spec.validate() {
        let message = summarize_validation_errors(&errors);
        warn!("Validation failed for RestApi {}: {}", key, message);
        publish_unhealthy(ctx, key, previous, REASON_INVALID_SPEC, &message).await;
        return Err(Error::ValidationError(message));
    }

    debug!("Fetching Redis {} for RestApi {}", api.spec.redis_name, key);
    let redis = match resolve_dependency(ctx, &api, key).await {
        Ok(redis) => redis,
        Err(e @ Error::DependencyNotFound { .. }) => {
            warn!("RestApi {} cannot make progress: {}", key, e);
            publish_unhealthy(ctx, key, previous, REASON_DEPENDENCY_NOT_FOUND, &e.to_string())
                .await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let children: Vec<ChildObject> = vec![
        build_frontend_deployment(&api, &redis)?.into(),
        build_frontend_service(&api)?.into(),
    ];

    let mut service = None;
    for child in &children {
        let applied = child.apply(&ctx.store).await?;
        debug!("Applied {} {}", applied.kind(), applied.name());
        if let Some(svc) = applied.into_service() {
            service = Some(svc);
        }
    }

    let url = service
        .as_ref()
        .map(|svc| url_for_service(svc, api.spec.frontend.serving_port))
        .unwrap_or_default();
    let dependency_ready = redis
        .status
        .as_ref()
        .map(|s| s.has_endpoints())
        .unwrap_or(false);

    let status = rest_api_status(&previous, url, dependency_ready);
    let unchanged = api.status.as_ref().is_some_and(|current| {
        current.url == status.url && conditions_match(&current.conditions, &status.conditions)
    });
    if unchanged {
        debug!("RestApi {} status unchanged, skipping status write", key);
    } else {
        ctx.store
            .patch_status::<RestApi>(key, serde_json::to_value(&status)?)
            .await?;
    }

    if status.url.is_empty() {
        info!("RestApi {} reconciled, waiting for an external address", key);
    } else {
        info!("RestApi {} reconciled, serving at {}", key, status.url);
    }

    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Best-effort status write for a RestApi that cannot converge
///
/// The URL is cleared so a stale address is never reported.
async fn publish_unhealthy<S: ObjectStore>(
    ctx: &Context<S>,
    key: &ObjectKey,
    mut conditions: Vec<StatusCondition>,
    reason: &str,
    message: &str,
) {
    set_condition(
        &mut conditions,
        CONDITION_TYPE_READY,
        ConditionStatus::Unhealthy,
        reason,
        message,
    );
    let status = RestApiStatus {
        url: String::new(),
        conditions,
    };

    let patch = match serde_json::to_value(&status) {
        Ok(patch) => patch,
        Err(e) => {
            warn!("Failed to serialize status for RestApi {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = ctx.store.patch_status::<RestApi>(key, patch).await {
        warn!("Failed to record {} for RestApi {}: {}", reason, key, e);
    }
}
