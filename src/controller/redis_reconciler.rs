//! Reconciler for Redis resources
//!
//! Computes the leader and follower Deployments and Services from scratch on
//! every run and applies them. Nothing is remembered between runs.

use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use super::child::ChildObject;
use super::conditions::{
    conditions_match, set_condition, CONDITION_TYPE_READY, REASON_INVALID_SPEC,
};
use super::context::Context;
use super::resources::{
    build_follower_deployment, build_leader_deployment, build_redis_service, RedisRole,
    ROLE_LABEL,
};
use super::status::redis_status;
use super::store::{ObjectKey, ObjectStore};
use crate::crd::{summarize_validation_errors, ConditionStatus, Redis, StatusCondition};
use crate::error::{Error, Result};

/// Build every child of a Redis, owner references included
///
/// Nothing is written until all four objects have been built.
pub fn desired_children(redis: &Redis) -> Result<Vec<ChildObject>> {
    Ok(vec![
        build_leader_deployment(redis)?.into(),
        build_follower_deployment(redis)?.into(),
        build_redis_service(redis, RedisRole::Leader)?.into(),
        build_redis_service(redis, RedisRole::Follower)?.into(),
    ])
}

/// Drive the children of one Redis toward its spec
#[instrument(skip(ctx), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_redis<S: ObjectStore>(ctx: &Context<S>, key: &ObjectKey) -> Result<Action> {
    let Some(redis) = ctx.store.get::<Redis>(key).await? else {
        debug!("Redis {} not found, assuming it was deleted", key);
        return Ok(Action::await_change());
    };

    info!(
        "Reconciling Redis {} (followers: {})",
        key, redis.spec.follower_replicas
    );

    let previous = redis
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();

    if let Err(errors) = redis.spec.validate() {
        let message = summarize_validation_errors(&errors);
        warn!("Validation failed for Redis {}: {}", key, message);
        publish_invalid_spec(ctx, key, previous, &message).await;
        return Err(Error::ValidationError(message));
    }

    let children = desired_children(&redis)?;

    let mut leader_service = String::new();
    let mut follower_service = String::new();
    for child in &children {
        let applied = child.apply(&ctx.store).await?;
        debug!("Applied {} {}", applied.kind(), applied.name());

        if let ChildObject::Service(_) = &applied {
            match applied.meta().labels.as_ref().and_then(|l| l.get(ROLE_LABEL)) {
                Some(role) if role == RedisRole::Leader.as_str() => {
                    leader_service = applied.name().to_string();
                }
                Some(role) if role == RedisRole::Follower.as_str() => {
                    follower_service = applied.name().to_string();
                }
                _ => {}
            }
        }
    }

    let status = redis_status(&previous, leader_service, follower_service);
    let unchanged = redis.status.as_ref().is_some_and(|current| {
        current.leader_service == status.leader_service
            && current.follower_service == status.follower_service
            && conditions_match(&current.conditions, &status.conditions)
    });
    // Probe-time-only changes are not written
    if unchanged {
        debug!("Redis {} status unchanged, skipping status write", key);
    } else {
        ctx.store
            .patch_status::<Redis>(key, serde_json::to_value(&status)?)
            .await?;
    }

    info!(
        "Redis {} reconciled (leader: {}, follower: {})",
        key, status.leader_service, status.follower_service
    );

    Ok(Action::requeue(ctx.config.resync_interval))
}

async fn publish_invalid_spec<S: ObjectStore>(
    ctx: &Context<S>,
    key: &ObjectKey,
    mut conditions: Vec<StatusCondition>,
    message: &str,
) {
    set_condition(
        &mut conditions,
        CONDITION_TYPE_READY,
        ConditionStatus::Unhealthy,
        REASON_INVALID_SPEC,
        message,
    );
    let patch = serde_json::json!({ "conditions": conditions });
    if let Err(e) = ctx.store.patch_status::<Redis>(key, patch).await {
        warn!("Failed to record invalid spec for Redis {}: {}", key, e);
    }
}
